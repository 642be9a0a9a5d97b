use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Result;

/// Source of the "topology change complete" signal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Wait for an operator to confirm on stdin
    #[default]
    Operator,
    /// Poll every member until it answers, then wait `settle_delay_in_ms`
    Probe,
    /// Treat every topology as settled at once
    Immediate,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,

    /// Polling policy for `SyncMode::Probe`
    #[serde(default)]
    pub probe: BackoffPolicy,

    /// Grace period after every member answered, to let rebalancing finish
    #[serde(default)]
    pub settle_delay_in_ms: u64,
}

impl SyncConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.probe.validate()
    }
}
