//! Configuration management module for the cluster verifier.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod cluster;
mod network;
mod retry;
mod sync;
mod verify;
pub use cluster::*;
pub use network::*;
pub use retry::*;
pub use sync::*;
pub use verify::*;
use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::ScalePlan;

/// Environment variable prefix, e.g. `CACHESCALE__NETWORK__REQUEST_TIMEOUT_IN_MS`
pub const ENV_PREFIX: &str = "CACHESCALE";

/// Main configuration container for a verification run
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct VerifierConfig {
    /// Node directory and initial membership
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Connection and per-exchange timeouts
    #[serde(default)]
    pub network: NetworkConfig,
    /// Assertion strictness
    #[serde(default)]
    pub verify: VerifyConfig,
    /// How topology changes are confirmed
    #[serde(default)]
    pub sync: SyncConfig,
    /// Scale plans to run, in order
    #[serde(default)]
    pub plans: Vec<ScalePlan>,
}

impl Debug for VerifierConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("cluster", &self.cluster)
            .field("plans", &self.plans.len())
            .finish()
    }
}

impl VerifierConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `CACHESCALE__` prefix (highest priority)
    ///
    /// # Note
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/scale.toml");
    /// std::env::set_var("CACHESCALE__SYNC__MODE", "probe");
    /// let cfg = VerifierConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Duplicate or unknown node ids
    /// - Zero timeouts
    /// - Plans that reference nodes outside the cluster
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.network.validate()?;
        self.verify.validate()?;
        self.sync.validate()?;
        for plan in &self.plans {
            plan.validate(&self.cluster)?;
        }
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
