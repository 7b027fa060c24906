use std::io;

use thiserror::Error;

use crate::protocol::{Opcode, ResponseCode, SetOperation, TransportError};

/// Every failure a Tyrant operation can surface.
///
/// Predicate validation (`Lookup`, `Value`) happens locally before any
/// round-trip; all other kinds are only known after one.
#[derive(Debug, Error)]
pub enum TyrantError {
    /// The stream broke or could not be framed. Never retried.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// Absent record or exhausted iteration.
    #[error("record not found")]
    NotFound,

    #[error("'{command}' rejected by server: {code}")]
    Remote {
        command: Opcode,
        code: ResponseCode,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("cannot mix {requested} with {existing}: metasearch branches must share one operator")]
    Composition {
        existing: SetOperation,
        requested: SetOperation,
    },

    #[error("unknown lookup '{lookup}'. available are: {known}")]
    Lookup { lookup: String, known: String },

    #[error("invalid value: {0}")]
    Value(String),

    #[error("index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<io::Error> for TyrantError {
    fn from(value: io::Error) -> Self {
        TyrantError::Connection(TransportError::Io(value))
    }
}

impl TyrantError {
    /// Translates [`TyrantError::NotFound`] into a key-absence error for `key`,
    /// leaving every other kind untouched.
    pub fn for_key(self, key: &str) -> Self {
        match self {
            TyrantError::NotFound => TyrantError::KeyNotFound(key.to_string()),
            e => e,
        }
    }
}
