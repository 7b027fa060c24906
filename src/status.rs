use std::collections::BTreeMap;

use log::trace;

use crate::{TyrantError, codec::DbType};

/// Server status parsed from the `key<TAB>value` lines returned by `stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    entries: BTreeMap<String, String>,
}

impl Stats {
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            match line.split_once('\t') {
                Some((key, value)) => {
                    entries.insert(key.to_string(), value.to_string());
                }
                None if line.is_empty() => {}
                None => trace!("skipping status line without a value: {line:?}"),
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The database flavor from the `type` line.
    pub fn db_type(&self) -> Result<DbType, TyrantError> {
        self.get("type")
            .ok_or_else(|| TyrantError::Malformed("status has no 'type' line".to_string()))?
            .parse()
    }

    pub fn record_count(&self) -> Option<u64> {
        self.get("rnum")?.parse().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
