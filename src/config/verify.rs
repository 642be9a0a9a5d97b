use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_MAX_LENGTH_SKEW;
use crate::Error;
use crate::Result;

/// What a read does with a recognized but non-canonical metadata line.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefectPolicy {
    /// Fail the read with `Error::KnownFormatDefect`
    #[default]
    Strict,
    /// Log the defect, count it in the report and keep going
    Tolerant,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyConfig {
    #[serde(default)]
    pub defect_policy: DefectPolicy,

    /// Largest declared-length drift still classified as a known defect;
    /// anything larger is an assertion failure
    #[serde(default = "default_max_length_skew")]
    pub max_length_skew: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            defect_policy: DefectPolicy::default(),
            max_length_skew: default_max_length_skew(),
        }
    }
}

impl VerifyConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_length_skew > 64 {
            return Err(Error::InvalidConfig(format!(
                "verify.max_length_skew {} is too large to be a formatting defect",
                self.max_length_skew
            )));
        }
        Ok(())
    }
}

fn default_max_length_skew() -> usize {
    DEFAULT_MAX_LENGTH_SKEW
}
