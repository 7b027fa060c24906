use std::{
    io::{Read, Write},
    net::TcpStream,
};

use log::info;

use crate::{
    TyrantError,
    codec::{DbType, Value, ValueCodec, table_fields},
    protocol::{ExtOptions, MiscOptions, Session, SessionConfig},
    query::Query,
    status::Stats,
};

/// Dictionary-style access to a key/value store.
pub trait KeyValueStore {
    type Keys<'a>: Iterator<Item = Result<String, TyrantError>>
    where
        Self: 'a;

    /// Fails with [`TyrantError::KeyNotFound`] when `key` is absent.
    fn get(&mut self, key: &str) -> Result<Value, TyrantError>;

    fn put(&mut self, key: &str, value: Value) -> Result<(), TyrantError>;

    /// Fails with [`TyrantError::KeyNotFound`] when `key` is absent.
    fn delete(&mut self, key: &str) -> Result<(), TyrantError>;

    fn contains(&mut self, key: &str) -> Result<bool, TyrantError>;

    fn keys(&mut self) -> Result<Self::Keys<'_>, TyrantError>;
}

/// A database behind one [`Session`].
///
/// The flavor is read from the server status when the handle is opened and
/// decides how values are encoded: table databases store column maps, all
/// others store bytes.
pub struct Tyrant<S: Read + Write = TcpStream> {
    session: Session<S>,
    codec: ValueCodec,
}

impl Tyrant<TcpStream> {
    pub fn connect(config: &SessionConfig) -> Result<Self, TyrantError> {
        Self::open(Session::connect(config)?)
    }
}

impl<S: Read + Write> Tyrant<S> {
    pub fn open(mut session: Session<S>) -> Result<Self, TyrantError> {
        let db_type = Stats::parse(&session.stat()?).db_type()?;
        info!("opened {db_type} database");
        Ok(Self {
            session,
            codec: ValueCodec::new(db_type),
        })
    }

    /// Stores and reads lists joined by `separator`. Has no effect on table
    /// databases.
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.codec = self.codec.with_separator(separator);
        self
    }

    pub fn db_type(&self) -> DbType {
        self.codec.db_type()
    }

    pub fn is_table(&self) -> bool {
        self.db_type().is_table()
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<S> {
        self.session
    }

    /// Number of records.
    pub fn len(&mut self) -> Result<u64, TyrantError> {
        self.session.rnum()
    }

    pub fn is_empty(&mut self) -> Result<bool, TyrantError> {
        Ok(self.len()? == 0)
    }

    /// Removes every record.
    pub fn clear(&mut self) -> Result<(), TyrantError> {
        self.session.vanish()
    }

    /// Appends `value` to the record. With a `width`, only the trailing
    /// `width` bytes are kept.
    pub fn concat(
        &mut self,
        key: &str,
        value: &[u8],
        width: Option<u32>,
    ) -> Result<(), TyrantError> {
        match width {
            Some(width) => self.session.putshl(key, value, width),
            None => self.session.putcat(key, value),
        }
    }

    pub fn value_size(&mut self, key: &str) -> Result<u32, TyrantError> {
        self.session.vsiz(key).map_err(|e| e.for_key(key))
    }

    pub fn stats(&mut self) -> Result<Stats, TyrantError> {
        Ok(Stats::parse(&self.session.stat()?))
    }

    /// Runs the server-side function `name`.
    pub fn call_func(
        &mut self,
        name: &str,
        key: &str,
        value: &[u8],
        opts: ExtOptions,
    ) -> Result<Vec<u8>, TyrantError> {
        self.session.ext(name, opts, key, value)
    }

    /// Records for the keys that exist, as returned by the server.
    pub fn multi_get(
        &mut self,
        keys: &[&str],
        opts: MiscOptions,
    ) -> Result<Vec<(String, Value)>, TyrantError> {
        self.session
            .getlist(keys, opts)?
            .into_iter()
            .map(|(key, raw)| -> Result<_, TyrantError> {
                Ok((utf8_key(key)?, self.codec.decode(raw)?))
            })
            .collect()
    }

    pub fn multi_set(
        &mut self,
        records: &[(&str, Value)],
        opts: MiscOptions,
    ) -> Result<(), TyrantError> {
        let pairs = records
            .iter()
            .map(|(key, value)| Ok((*key, self.codec.encode(value)?)))
            .collect::<Result<Vec<_>, TyrantError>>()?;
        self.session.putlist(&pairs, opts)
    }

    pub fn multi_del(&mut self, keys: &[&str], opts: MiscOptions) -> Result<(), TyrantError> {
        self.session.outlist(keys, opts)
    }

    /// Keys starting with `prefix`, at most `max` of them.
    pub fn prefix_keys(
        &mut self,
        prefix: &str,
        max: Option<u32>,
    ) -> Result<Vec<String>, TyrantError> {
        self.session
            .fwmkeys(prefix, max)?
            .into_iter()
            .map(utf8_key)
            .collect()
    }

    pub fn sync(&mut self) -> Result<(), TyrantError> {
        self.session.sync()
    }

    /// An unfiltered query decoding records the way this handle does.
    pub fn query(&self) -> Query {
        Query::new(self.codec.clone())
    }
}

impl<S: Read + Write> KeyValueStore for Tyrant<S> {
    type Keys<'a>
        = Keys<'a, S>
    where
        Self: 'a;

    fn get(&mut self, key: &str) -> Result<Value, TyrantError> {
        let raw = self.session.get(key).map_err(|e| e.for_key(key))?;
        self.codec.decode(raw)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), TyrantError> {
        match &value {
            Value::Table(columns) if self.is_table() => {
                let mut args = vec![key.as_bytes().to_vec()];
                args.extend(table_fields(columns)?);
                self.session.misc("put", &args, MiscOptions::empty())?;
                Ok(())
            }
            _ => {
                let raw = self.codec.encode(&value)?;
                self.session.put(key, raw)
            }
        }
    }

    fn delete(&mut self, key: &str) -> Result<(), TyrantError> {
        self.session.out(key).map_err(|e| e.for_key(key))
    }

    fn contains(&mut self, key: &str) -> Result<bool, TyrantError> {
        match self.session.vsiz(key) {
            Ok(_) => Ok(true),
            Err(TyrantError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Starts the session's key iteration. Only one may be open at a time.
    fn keys(&mut self) -> Result<Self::Keys<'_>, TyrantError> {
        self.session.iterinit()?;
        Ok(Keys {
            session: &mut self.session,
            finished: false,
        })
    }
}

/// Every key of the database, in the server's iteration order.
pub struct Keys<'a, S: Read + Write> {
    session: &'a mut Session<S>,
    finished: bool,
}

impl<S: Read + Write> Iterator for Keys<'_, S> {
    type Item = Result<String, TyrantError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.session.iternext() {
            Ok(key) => Some(utf8_key(key)),
            Err(TyrantError::NotFound) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn utf8_key(raw: Vec<u8>) -> Result<String, TyrantError> {
    String::from_utf8(raw).map_err(|e| TyrantError::Malformed(format!("non UTF-8 key: {e}")))
}
