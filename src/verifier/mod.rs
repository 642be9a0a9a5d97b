//! Cluster scale verification
//!
//! Runs [`ScalePlan`]s: each stage may add or remove a node, waits for the
//! cluster to settle through a [`TopologySync`], then checks that data
//! written through any member is visible through every member.

mod cluster_verifier;
mod connector;
mod report;
mod scenario;
mod sync;
mod topology;

pub use cluster_verifier::*;
pub use connector::*;
pub use report::*;
pub use scenario::*;
pub use sync::*;
pub use topology::*;

#[cfg(test)]
mod topology_test;
