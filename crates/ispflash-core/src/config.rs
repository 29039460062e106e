//! Session configuration and device quirks.
//!
//! Quirks are a closed set of typed keys. Hosts that keep configuration as
//! `KEY=VALUE` strings go through [`SessionConfig::apply_quirk`], which
//! rejects anything it does not recognize.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ProtocolFamily;
use crate::protocol::constants::{FW_PAGE_SIZE, ISP_DATA_BLOCKSIZE};
use crate::retry::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown quirk key '{0}'")]
    UnknownQuirk(String),

    #[error("Invalid value '{value}' for quirk {key}")]
    InvalidQuirkValue { key: QuirkKey, value: String },

    #[error("Malformed quirk '{0}', expected KEY=VALUE")]
    MalformedQuirk(String),

    #[error("Block size {block_size} outside {min}..={max} for the {family} family")]
    BlockSize {
        family: ProtocolFamily,
        block_size: u16,
        min: u16,
        max: u16,
    },

    #[error("{name} poll needs at least one attempt")]
    EmptyPolicy { name: &'static str },
}

/// Recognized quirk keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuirkKey {
    /// Number of 64-byte pages the touchpad flash holds.
    ElantpIcPageCount,
}

impl QuirkKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuirkKey::ElantpIcPageCount => "ElantpIcPageCount",
        }
    }
}

impl fmt::Display for QuirkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuirkKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ElantpIcPageCount" => Ok(QuirkKey::ElantpIcPageCount),
            other => Err(ConfigError::UnknownQuirk(other.to_string())),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex integer no larger than `max`.
fn parse_bounded(value: &str, max: u64) -> Option<u64> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => value.parse::<u64>().ok()?,
    };
    (parsed <= max).then_some(parsed)
}

/// Configuration for one device session.
///
/// Unset policies and sizes fall back to the family defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Protocol family of the device.
    pub family: ProtocolFamily,
    /// Per-step status polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_poll: Option<RetryPolicy>,
    /// Confirmation that the device left normal mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detach_poll: Option<RetryPolicy>,
    /// Bytes per streamed block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u16>,
    /// Flash capacity in firmware pages, from `ElantpIcPageCount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ic_page_count: Option<u16>,
}

impl SessionConfig {
    pub fn new(family: ProtocolFamily) -> Self {
        Self {
            family,
            status_poll: None,
            detach_poll: None,
            block_size: None,
            ic_page_count: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn status_policy(&self) -> RetryPolicy {
        self.status_poll.unwrap_or(match self.family {
            ProtocolFamily::Opcode => RetryPolicy::new(4200, 3),
            ProtocolFamily::Register => RetryPolicy::new(100, 10),
        })
    }

    pub fn detach_policy(&self) -> RetryPolicy {
        self.detach_poll.unwrap_or(match self.family {
            ProtocolFamily::Opcode => RetryPolicy::new(100, 3),
            ProtocolFamily::Register => RetryPolicy::new(20, 30),
        })
    }

    pub fn block_size(&self) -> u16 {
        self.block_size
            .unwrap_or(*block_size_range(self.family).end())
    }

    /// Apply one quirk, replacing any earlier value.
    pub fn apply_quirk(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key: QuirkKey = key.trim().parse()?;
        match key {
            QuirkKey::ElantpIcPageCount => {
                let count = parse_bounded(value, u16::MAX as u64).ok_or_else(|| {
                    ConfigError::InvalidQuirkValue {
                        key,
                        value: value.to_string(),
                    }
                })?;
                self.ic_page_count = Some(count as u16);
            }
        }
        Ok(())
    }

    /// Apply a quirk given as `KEY=VALUE`.
    pub fn apply_quirk_str(&mut self, quirk: &str) -> Result<(), ConfigError> {
        let (key, value) = quirk
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedQuirk(quirk.to_string()))?;
        self.apply_quirk(key, value)
    }

    /// Check policies and block size against the family.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_policy().max_attempts == 0 {
            return Err(ConfigError::EmptyPolicy { name: "Status" });
        }
        if self.detach_policy().max_attempts == 0 {
            return Err(ConfigError::EmptyPolicy { name: "Detach" });
        }
        let range = block_size_range(self.family);
        let block_size = self.block_size();
        if !range.contains(&block_size) {
            return Err(ConfigError::BlockSize {
                family: self.family,
                block_size,
                min: *range.start(),
                max: *range.end(),
            });
        }
        Ok(())
    }
}

/// Block sizes a family's devices accept.
///
/// Opcode blocks share a 32-byte ISP packet with the two address bytes;
/// register blocks are whole firmware pages.
pub fn block_size_range(family: ProtocolFamily) -> RangeInclusive<u16> {
    match family {
        ProtocolFamily::Opcode => 1..=ISP_DATA_BLOCKSIZE,
        ProtocolFamily::Register => FW_PAGE_SIZE as u16..=FW_PAGE_SIZE as u16,
    }
}
