//! Text protocol client
//!
//! Encodes `set`/`get`/`delete` requests for a single connection and decodes
//! the server's line-oriented replies:
//! - [`CacheClient`] - operations the verifier depends on
//! - [`Connection`] - stream-backed implementation with per-exchange timeouts
//! - [`Metadata`] - parsed `VALUE` header and its canonical-format check

mod client;
mod command;
mod connection;
mod record;
mod response;

pub use client::*;
pub use connection::*;
pub use record::*;
pub use response::*;
