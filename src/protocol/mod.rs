//! Client side of the Tyrant binary protocol.
//!
//! This module defines how requests are framed, how replies are decoded and how
//! status codes turn into [`TyrantError`](crate::TyrantError) kinds. Everything
//! above it ([`query`](crate::query), [`Tyrant`](crate::Tyrant)) talks to the
//! server exclusively through a [`Session`].
//!
//! # Overview
//!
//! A [`Session`] owns one persistent stream and runs strictly one request at a
//! time: the request is written in full, then the complete reply is read
//! before the call returns. There is no pipelining and no automatic retry.
//!
//! # Key Components
//!
//! - [`Request`]: builder for one framed request (magic byte, opcode, header
//!   fields, bodies).
//! - [`ProtocolTransport`]: encodes requests and decodes reply fields over any
//!   `Read + Write` stream.
//! - [`Session`]: connection lifecycle plus one method per remote verb.
//! - [`SearchRequest`]: a table search compiled to `misc("search")` arguments.
//!
//! # Binary Format
//!
//! - Every request begins with the magic byte `0xC8` and the opcode.
//! - Fixed-width header fields follow (sizes, counts, numbers), then the raw
//!   bodies they describe.
//! - All integers are big-endian.
//! - A reply starts with one status byte. Anything after it is only present on
//!   success and its layout depends on the verb.
//!
//! # See Also
//!
//! - [`query`](crate::query): lazy predicate queries built on [`Session::search`].
mod commands;
mod options;
mod request;
mod response;
mod search;
mod session;
mod transport;

#[cfg(test)]
pub(crate) use session::mock;

pub use options::{ConditionFlags, ExtOptions, MiscOptions};
pub use request::{MAGIC, Opcode, Request};
pub use response::ResponseCode;
pub use search::{OrderType, PreparedCondition, SearchMode, SearchRequest, SetOperation, operator};
pub use session::{DEFAULT_HOST, DEFAULT_PORT, Session, SessionConfig, Timeouts};
pub use transport::{ProtocolTransport, TransportError};
