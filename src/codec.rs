//! Conversion between raw record bytes and structured values.
//!
//! Table databases store a record as NUL-separated alternating column names
//! and values. Every other flavor stores opaque bytes, optionally split into
//! a list on a configured separator byte.
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::TyrantError;

/// Column separator inside table records.
pub const TABLE_SEPARATOR: u8 = 0;

/// Database flavor as reported by the `type` line of `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Hash,
    BTree,
    FixedLength,
    Table,
    MemoryHash,
    MemoryTree,
}

impl DbType {
    pub fn name(&self) -> &'static str {
        match self {
            DbType::Hash => "hash",
            DbType::BTree => "B+ tree",
            DbType::FixedLength => "fixed-length",
            DbType::Table => "table",
            DbType::MemoryHash => "on-memory hash",
            DbType::MemoryTree => "on-memory tree",
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, DbType::Table)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbType {
    type Err = TyrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(DbType::Hash),
            "B+ tree" => Ok(DbType::BTree),
            "fixed-length" => Ok(DbType::FixedLength),
            "table" => Ok(DbType::Table),
            "on-memory hash" => Ok(DbType::MemoryHash),
            "on-memory tree" => Ok(DbType::MemoryTree),
            other => Err(TyrantError::Malformed(format!(
                "unknown database type '{other}'"
            ))),
        }
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    List(Vec<Vec<u8>>),
    Table(BTreeMap<String, String>),
}

impl Value {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Value::Table(columns) => Some(columns),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<BTreeMap<String, String>> {
        match self {
            Value::Table(columns) => Some(columns),
            _ => None,
        }
    }

    /// Column value of a table record.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.as_table()?.get(name).map(String::as_str)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// Booleans are stored as `"1"` or the empty string.
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bytes(if value { b"1".to_vec() } else { Vec::new() })
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(value: BTreeMap<String, String>) -> Self {
        Value::Table(value)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Value {
    fn from(columns: [(K, V); N]) -> Self {
        Value::Table(
            columns
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCodec {
    db_type: DbType,
    separator: Option<u8>,
}

impl ValueCodec {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            separator: None,
        }
    }

    /// Splits non-table values into lists on `separator`.
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn separator(&self) -> Option<u8> {
        self.separator
    }

    pub fn decode(&self, raw: Vec<u8>) -> Result<Value, TyrantError> {
        if self.db_type.is_table() {
            return decode_table(&raw).map(Value::Table);
        }
        match self.separator {
            Some(sep) if raw.contains(&sep) => Ok(Value::List(
                raw.split(|b| *b == sep).map(<[u8]>::to_vec).collect(),
            )),
            _ => Ok(Value::Bytes(raw)),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, TyrantError> {
        match (value, self.db_type.is_table()) {
            (Value::Table(columns), true) => Ok(table_fields(columns)?.join(&TABLE_SEPARATOR)),
            (Value::Table(_), false) => Err(TyrantError::Codec(format!(
                "column maps can only be stored in a table database, not {}",
                self.db_type
            ))),
            (_, true) => Err(TyrantError::Codec(
                "table databases only store column maps".to_string(),
            )),
            (Value::Bytes(bytes), false) => Ok(bytes.clone()),
            (Value::List(items), false) => {
                let sep = self.separator.ok_or_else(|| {
                    TyrantError::Codec("storing a list requires a separator".to_string())
                })?;
                if items.iter().any(|item| item.contains(&sep)) {
                    return Err(TyrantError::Codec(
                        "list element contains the separator".to_string(),
                    ));
                }
                Ok(items.join(&sep))
            }
        }
    }
}

/// Alternating column names and values, ready to be sent as separate arguments.
pub fn table_fields(columns: &BTreeMap<String, String>) -> Result<Vec<Vec<u8>>, TyrantError> {
    let mut fields = Vec::with_capacity(columns.len() * 2);
    for (name, value) in columns {
        if name.is_empty() {
            return Err(TyrantError::Codec("column names cannot be empty".to_string()));
        }
        for part in [name, value] {
            if part.as_bytes().contains(&TABLE_SEPARATOR) {
                return Err(TyrantError::Codec(format!(
                    "column '{name}' contains a NUL byte"
                )));
            }
            fields.push(part.as_bytes().to_vec());
        }
    }
    Ok(fields)
}

fn decode_table(raw: &[u8]) -> Result<BTreeMap<String, String>, TyrantError> {
    let mut columns = BTreeMap::new();
    if raw.is_empty() {
        return Ok(columns);
    }

    let parts: Vec<&[u8]> = raw.split(|b| *b == TABLE_SEPARATOR).collect();
    if parts.len() % 2 != 0 {
        return Err(TyrantError::Codec(format!(
            "table record has {} fields, expected name/value pairs",
            parts.len()
        )));
    }
    for pair in parts.chunks_exact(2) {
        let name = utf8(pair[0])?;
        // projected search results lead with the primary key under an empty name
        if name.is_empty() {
            continue;
        }
        columns.insert(name, utf8(pair[1])?);
    }
    Ok(columns)
}

fn utf8(bytes: &[u8]) -> Result<String, TyrantError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| TyrantError::Codec(e.to_string()))
}
