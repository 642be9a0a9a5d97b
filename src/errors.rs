//! Cache Cluster Verification Error Hierarchy
//!
//! Defines the error types surfaced by the protocol client and the cluster
//! verifier, categorized by the layer that detected the failure. Every
//! variant carries the node, the operation and the raw wire content needed
//! to diagnose a failure without re-running the scenario.

use std::fmt;
use std::time::Duration;

use config::ConfigError;

use crate::constants::DELETE_TERMINALS;
use crate::constants::GET_TERMINALS;
use crate::constants::RESP_STORED;
use crate::constants::RESP_VERSION;
use crate::NodeId;
use crate::TopologyId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unexpected wire responses
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Observed data differs from what the scenario stored
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// Recognized but non-canonical metadata line, rejected by a strict run
    #[error(transparent)]
    KnownFormatDefect(#[from] FormatDefect),

    /// No terminal response within the configured bound
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Connect and socket level failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Topology-change synchronization failures
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Illegal membership changes or unknown nodes
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Configuration source or parsing failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Harness bugs, e.g. an illegal scenario phase transition
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Protocol operation that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Get,
    Delete,
    Version,
}

impl fmt::Display for Op {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Op::Set => "set",
            Op::Get => "get",
            Op::Delete => "delete",
            Op::Version => "version",
        };
        f.write_str(name)
    }
}

impl Op {
    /// Terminal reply a well-behaved server sends for this operation.
    pub fn expected_reply(self) -> &'static str {
        match self {
            Op::Set => RESP_STORED,
            Op::Get => GET_TERMINALS,
            Op::Delete => DELETE_TERMINALS,
            Op::Version => RESP_VERSION,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Terminal line outside the set the command allows
    #[error("{op} {key} on {node}: expected {expected}, got {raw:?}")]
    UnexpectedTerminal {
        node: String,
        op: Op,
        key: String,
        expected: &'static str,
        raw: String,
    },

    /// Retrieval reply whose line structure is not END or VALUE/value/END
    #[error("get {key} on {node}: expected {expected}, got malformed response {raw:?}")]
    MalformedResponse {
        node: String,
        key: String,
        expected: &'static str,
        raw: String,
    },

    /// VALUE line that cannot be split into key, flag and length
    #[error("get {key} on {node}: unparseable metadata line {line:?} in {raw:?}")]
    MalformedMetadata {
        node: String,
        key: String,
        line: String,
        raw: String,
    },

    /// Peer closed the stream before a terminal line arrived
    #[error("{op} {key} on {node}: expected {expected}, connection closed after {raw:?}")]
    ConnectionClosed {
        node: String,
        op: Op,
        key: String,
        expected: &'static str,
        raw: String,
    },

    /// An earlier exchange timed out or left reply lines unread
    #[error("{op} {key} on {node}: not sent, connection is desynchronized by an earlier exchange")]
    Desynchronized { node: String, op: Op, key: String },

    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid value for key {key:?}: {reason}")]
    InvalidValue { key: String, reason: &'static str },
}

/// Data-loss or stale-read defect: the cluster answered, but with the wrong
/// content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} {key} on {node}: expected {expected:?}, actual {actual:?}")]
pub struct AssertionFailure {
    pub node: String,
    pub op: Op,
    pub key: String,
    pub expected: String,
    pub actual: String,
}

/// Shape of a non-canonical metadata line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectKind {
    /// Declared length differs from the value's byte length by a small amount
    LengthSkew { declared: usize, actual: usize },
    /// No separator between the flag and length fields
    FusedFlagLength,
    /// Fields separated by something other than a single space
    IrregularSpacing,
    /// Numeric field spelled differently from its canonical form, e.g. `05`
    NonCanonicalField,
}

impl fmt::Display for DefectKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DefectKind::LengthSkew { declared, actual } => {
                write!(f, "length skew (declared {declared}, actual {actual})")
            }
            DefectKind::FusedFlagLength => f.write_str("fused flag/length"),
            DefectKind::IrregularSpacing => f.write_str("irregular spacing"),
            DefectKind::NonCanonicalField => f.write_str("non-canonical field"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("get {key} on {node}: known format defect [{}]: expected {expected:?}, actual {actual:?}", kinds_summary(.kinds))]
pub struct FormatDefect {
    pub node: String,
    pub key: String,
    pub kinds: Vec<DefectKind>,
    pub expected: String,
    pub actual: String,
}

fn kinds_summary(kinds: &[DefectKind]) -> String {
    kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, thiserror::Error)]
#[error("{op} {key} on {node}: no terminal response after {after:?}, partial {partial:?}")]
pub struct TimeoutError {
    pub node: String,
    pub op: Op,
    pub key: String,
    pub after: Duration,
    pub partial: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Connect to {node} failed: {source}")]
    ConnectFailed {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {node} timed out after {after:?}")]
    ConnectTimeout { node: String, after: Duration },

    #[error("{op} {key} on {node}: socket error: {source}")]
    Io {
        node: String,
        op: Op,
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Operator refused or cancelled the topology change
    #[error("Topology {topology} change aborted: {reason}")]
    Aborted { topology: TopologyId, reason: String },

    /// Health probe never saw the member answer
    #[error("Topology {topology}: node {node} not ready after {attempts} probes")]
    ProbeExhausted {
        topology: TopologyId,
        node: String,
        attempts: usize,
    },

    #[error("Operator input failed: {0}")]
    Input(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Node {0} is not defined in the cluster config")]
    UnknownNode(NodeId),

    #[error("Node {0} is already a member")]
    DuplicateMember(NodeId),

    #[error("Node {0} is not a member")]
    NotAMember(NodeId),

    #[error("Cannot remove node {0}: it is the last member")]
    LastMember(NodeId),
}
