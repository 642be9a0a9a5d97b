use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::KEY_MAX_LENGTH;
use crate::ProtocolError;

/// Expiration hint sent with every store command.
///
/// The wire encodes "never expire" as `0`; any other value is a relative
/// number of seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Exptime {
    #[default]
    Never,
    Seconds(u32),
}

impl Exptime {
    pub fn to_wire(self) -> u32 {
        match self {
            Exptime::Never => 0,
            Exptime::Seconds(secs) => secs,
        }
    }
}

impl From<u32> for Exptime {
    fn from(secs: u32) -> Self {
        match secs {
            0 => Exptime::Never,
            secs => Exptime::Seconds(secs),
        }
    }
}

impl From<Exptime> for u32 {
    fn from(exptime: Exptime) -> Self {
        exptime.to_wire()
    }
}

/// Logical unit stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
    pub flag: u32,
    pub exptime: Exptime,
}

impl Record {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flag: 0,
            exptime: Exptime::Never,
        }
    }

    pub fn with_flag(
        mut self,
        flag: u32,
    ) -> Self {
        self.flag = flag;
        self
    }

    pub fn with_exptime(
        mut self,
        exptime: Exptime,
    ) -> Self {
        self.exptime = exptime;
        self
    }

    /// Values are line-framed on the way back, so CR and LF are rejected
    /// before anything reaches the wire.
    pub fn validate(&self) -> std::result::Result<(), ProtocolError> {
        validate_key(&self.key)?;
        if self.value.iter().any(|b| *b == b'\r' || *b == b'\n') {
            return Err(ProtocolError::InvalidValue {
                key: self.key.clone(),
                reason: "value must not contain CR or LF",
            });
        }
        Ok(())
    }
}

/// Applies the server's key rules: 1..=250 bytes, no whitespace or
/// control characters.
pub fn validate_key(key: &str) -> std::result::Result<(), ProtocolError> {
    let reason = if key.is_empty() {
        Some("key must not be empty")
    } else if key.len() > KEY_MAX_LENGTH {
        Some("key longer than 250 bytes")
    } else if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        Some("key contains whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ProtocolError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
