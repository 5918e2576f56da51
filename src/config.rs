//! Stack configuration parameters
//!
//! Read from an mctpd-style TOML file.  Every key is optional; missing
//! keys fall back to the defaults below, and keys this crate does not
//! know (e.g. mctpd's `uuid`) are ignored.
//!
//! ```toml
//! mode = "bus-owner"
//!
//! [mctp]
//! message_timeout_ms = 30
//!
//! [bus-owner]
//! dynamic_eid_range = [8, 254]
//! max_pool_size = 15
//! ```

use core::fmt;
use core::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mctp::eid::Eid;
use crate::mctp::packet::BASELINE_MTU;
use crate::mctp::serial::SERIAL_MAX_PACKET;
use crate::mctp::packet::HEADER_SIZE;

/// Role this stack plays on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    BusOwner,
    Endpoint,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctpConfig {
    pub mode: Mode,
    pub mctp: MctpSection,
    #[serde(rename = "bus-owner")]
    pub bus_owner: BusOwnerSection,
    pub pldm: PldmSection,
}

/// `[mctp]`: transport timing and sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctpSection {
    /// Control request response timeout (milliseconds)
    pub message_timeout_ms: u32,
    /// MCTP network the links belong to
    pub network_id: u32,
    /// Time a partially reassembled message may stay open (milliseconds)
    pub reassembly_timeout_ms: u32,
    /// Largest message accepted by the reassembler (bytes, excluding type)
    pub max_message_size: usize,
    /// Transmission unit: payload bytes per packet
    pub mtu: usize,
}

/// `[bus-owner]`: dynamic EID assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusOwnerSection {
    /// Inclusive EID range handed out to endpoints (either order)
    pub dynamic_eid_range: [u8; 2],
    /// Largest EID pool granted to a single bridge
    pub max_pool_size: u8,
    /// Set Endpoint ID retransmissions before giving up
    pub set_eid_retries: u8,
}

/// `[pldm]`: terminus identity and requester timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PldmSection {
    /// Local terminus ID
    pub tid: u8,
    /// Time before an unanswered request is retried (milliseconds)
    pub response_timeout_ms: u32,
    /// Retries before a request is reported as timed out
    pub retries: u8,
}

impl Default for MctpConfig {
    fn default() -> Self {
        Self {
            mode: Mode::BusOwner,
            mctp: MctpSection::default(),
            bus_owner: BusOwnerSection::default(),
            pldm: PldmSection::default(),
        }
    }
}

impl Default for MctpSection {
    fn default() -> Self {
        Self {
            message_timeout_ms: 30,
            network_id: 1,
            reassembly_timeout_ms: 100,
            max_message_size: 4096,
            mtu: BASELINE_MTU,
        }
    }
}

impl Default for BusOwnerSection {
    fn default() -> Self {
        Self {
            dynamic_eid_range: [Eid::MIN_ASSIGNABLE, Eid::MAX_ASSIGNABLE],
            max_pool_size: 15,
            set_eid_retries: 2,
        }
    }
}

impl Default for PldmSection {
    fn default() -> Self {
        Self {
            tid: 1,
            response_timeout_ms: 500,
            retries: 2,
        }
    }
}

impl MctpConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Put `dynamic_eid_range` in ascending order.
    pub fn normalize(&mut self) {
        let [a, b] = self.bus_owner.dynamic_eid_range;
        self.bus_owner.dynamic_eid_range = [a.min(b), a.max(b)];
    }

    /// Reject values the stack cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [start, end] = self.bus_owner.dynamic_eid_range;
        if start > end {
            return Err(ConfigError::Invalid("dynamic_eid_range is not normalised"));
        }
        if !Eid(start).is_assignable() || !Eid(end).is_assignable() {
            return Err(ConfigError::Invalid(
                "dynamic_eid_range must lie within 8..=254",
            ));
        }
        if self.bus_owner.max_pool_size == 0 {
            return Err(ConfigError::Invalid("max_pool_size must be at least 1"));
        }
        if self.mctp.mtu < BASELINE_MTU || self.mctp.mtu > SERIAL_MAX_PACKET - HEADER_SIZE {
            return Err(ConfigError::Invalid("mtu must lie within 64..=120"));
        }
        if self.mctp.message_timeout_ms == 0
            || self.mctp.reassembly_timeout_ms == 0
            || self.pldm.response_timeout_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts must be non-zero"));
        }
        if self.mctp.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be non-zero"));
        }
        if self.pldm.tid == 0 || self.pldm.tid == 0xFF {
            return Err(ConfigError::Invalid("tid must not be 0 or 255"));
        }
        Ok(())
    }

    /// The dynamic EID range as an inclusive range.
    pub fn eid_range(&self) -> RangeInclusive<u8> {
        let [start, end] = self.bus_owner.dynamic_eid_range;
        start.min(end)..=start.max(end)
    }
}

/// Configuration load / validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read.
    Io(String),
    /// File is not valid TOML or has wrongly typed keys.
    Parse(String),
    /// A value is out of range.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read config: {msg}"),
            Self::Parse(msg) => write!(f, "cannot parse config: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
