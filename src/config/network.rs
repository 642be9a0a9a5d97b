use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Socket parameters shared by every node connection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Bound on one exchange, from writing the request to reading its
    /// terminal line
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Read and write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            tcp_nodelay: default_tcp_nodelay(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl NetworkConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network connect timeout must be > 0".to_string(),
            )));
        }

        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network request timeout must be > 0".to_string(),
            )));
        }

        const MIN_BUFFER: usize = 512;
        if self.buffer_size < MIN_BUFFER {
            return Err(Error::Config(ConfigError::Message(format!(
                "network buffer size {} below minimum {}",
                self.buffer_size, MIN_BUFFER
            ))));
        }

        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    5000
}
fn default_tcp_nodelay() -> bool {
    true
}
fn default_buffer_size() -> usize {
    8192
}
