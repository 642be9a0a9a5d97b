//! Memcached text-protocol client and cluster scale verification harness.
//!
//! - [`Connection`] speaks `set`/`get`/`delete`/`version` to one node
//! - [`ClusterVerifier`] runs [`ScalePlan`]s that add and remove nodes and
//!   checks cross-node visibility after every change
//! - [`VerifierConfig`] loads the cluster, timeouts and plans

mod config;
mod constants;
mod errors;
mod protocol;
mod utils;
mod verifier;

pub use self::config::*;
pub use errors::*;
pub use protocol::*;
pub use verifier::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
