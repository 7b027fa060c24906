//! A client for the Tyrant remote key/value and table database protocol.
//!
//! - [`protocol`]: request framing, reply decoding and one [`Session`] method
//!   per remote verb.
//! - [`query`]: lazy, cached predicate queries over table databases.
//! - [`Tyrant`]: dictionary-style handle owning a session.
pub mod cli;
pub mod codec;
pub mod command;
pub mod error;
pub mod protocol;
pub mod query;
pub mod status;
pub mod tyrant;

pub use cli::{execute, prompt};
pub use codec::{DbType, Value, ValueCodec};
pub use command::{Command, CommandError};
pub use error::TyrantError;
pub use protocol::{ExtOptions, MiscOptions, Session, SessionConfig, Timeouts};
pub use query::{Condition, Expression, Ordering, Query, Scalar};
pub use status::Stats;
pub use tyrant::{KeyValueStore, Tyrant};
