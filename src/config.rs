//! # Attach-time Configuration
//!
//! The radio parameters applied after the reset pulse and the polling budgets
//! used by the transmit path. Every field has a default, so a partial JSON
//! file only needs to name what it overrides:
//!
//! ```json
//! {
//!   "frequency_hz": 915000000,
//!   "tx_power_dbm": 14,
//!   "data_rate_policy": "reject"
//! }
//! ```

use crate::error::HwError;
use crate::poll::PollPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Carrier frequency applied at attach (915 MHz)
pub const DEFAULT_FREQUENCY_HZ: u32 = 915_000_000;

/// Data rate applied at attach (700 kbps)
pub const DEFAULT_DATA_RATE_BPS: u32 = 700_000;

/// Transmit power applied at attach, in dBm
pub const DEFAULT_TX_POWER_DBM: u8 = 20;

/// Receive gain applied at attach, in dB
pub const DEFAULT_RX_GAIN_DB: u8 = 30;

/// Minimum hold time on each edge of the reset pulse
pub const MIN_RESET_HOLD_US: u32 = 1_000;

/// How to handle data rates whose kbps value does not fit the 8-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRatePolicy {
    /// Write the low 8 bits of the kbps value. This is what deployed devices
    /// have always been programmed with, 700 kbps included.
    #[default]
    Truncate,
    /// Refuse with `InvalidArgument` and leave the register untouched.
    Reject,
}

/// Configuration for the hardware controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwConfig {
    /// Carrier frequency in Hz
    pub frequency_hz: u32,
    /// Data rate in bits per second
    pub data_rate_bps: u32,
    /// Transmit power in dBm
    pub tx_power_dbm: u8,
    /// Receive gain in dB
    pub rx_gain_db: u8,
    /// Hold time on each edge of the reset pulse, in microseconds
    pub reset_hold_us: u32,
    /// Out-of-range data rate handling
    pub data_rate_policy: DataRatePolicy,
    /// Wait for the transmitter to go idle before a transmit
    pub ready_wait: PollPolicy,
    /// Wait for a transmit to complete
    pub tx_complete_wait: PollPolicy,
}

impl Default for HwConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            data_rate_bps: DEFAULT_DATA_RATE_BPS,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            rx_gain_db: DEFAULT_RX_GAIN_DB,
            reset_hold_us: MIN_RESET_HOLD_US,
            data_rate_policy: DataRatePolicy::default(),
            ready_wait: PollPolicy::READY_WAIT,
            tx_complete_wait: PollPolicy::TX_COMPLETE,
        }
    }
}

impl HwConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, HwError> {
        let config: HwConfig =
            serde_json::from_str(json).map_err(|e| HwError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HwError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| HwError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Check the values the hardware timing depends on.
    ///
    /// Radio parameters are checked when they are applied, not here.
    pub fn validate(&self) -> Result<(), HwError> {
        if self.reset_hold_us < MIN_RESET_HOLD_US {
            return Err(HwError::Config(format!(
                "reset_hold_us must be at least {MIN_RESET_HOLD_US}, got {}",
                self.reset_hold_us
            )));
        }
        for (name, policy) in [
            ("ready_wait", &self.ready_wait),
            ("tx_complete_wait", &self.tx_complete_wait),
        ] {
            if policy.attempts == 0 {
                return Err(HwError::Config(format!("{name}.attempts must be non-zero")));
            }
        }
        Ok(())
    }
}
