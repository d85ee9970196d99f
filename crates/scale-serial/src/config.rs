//! Scale reader configuration
//!
//! Configuration types for the transport, the serial line and the reader's
//! retry behaviour. Everything deserializes from TOML with defaults, so an
//! empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration for a scale connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Line speed used by the next `connect()`
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Reader retry behaviour after read failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            baud_rate: default_baud_rate(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScaleConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_baud_rate() -> u32 {
    9600
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Physical serial port
    Serial(SerialPortConfig),
    /// Simulated device for testing and demos
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Serial(SerialPortConfig::default())
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortConfig {
    /// Port path (e.g. "/dev/ttyUSB0", "COM3"). When absent the first USB
    /// serial port found is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Blocking read timeout used to poll for cancellation
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Maximum bytes per chunk handed to the reader loop
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for SerialPortConfig {
    fn default() -> Self {
        Self {
            port: None,
            read_timeout_ms: default_read_timeout(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_read_timeout() -> u64 {
    100
}

fn default_chunk_size() -> usize {
    256
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Frames replayed in a loop once the port is opened (CRLF appended).
    /// Empty means the mock only emits what tests push into it.
    #[serde(default)]
    pub frames: Vec<String>,
    /// Delay between replayed frames
    #[serde(default = "default_mock_interval")]
    pub interval_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            interval_ms: default_mock_interval(),
        }
    }
}

impl MockConfig {
    /// A simulated scale cycling through the layouts the parser understands
    pub fn demo() -> Self {
        Self {
            frames: vec![
                "1,ST,100,0,kg".to_string(),
                "ST,GS,+0012.40kg".to_string(),
                "12.50 kg".to_string(),
                "     0,kg".to_string(),
                "-- OVERLOAD --".to_string(),
                "27.5,lb".to_string(),
            ],
            interval_ms: default_mock_interval(),
        }
    }
}

fn default_mock_interval() -> u64 {
    500
}

// =============================================================================
// Line Settings
// =============================================================================

/// Parity setting of the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control setting of the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Serial line parameters passed to `open()`
///
/// Only the baud rate is user-settable; scales speak 8N1 without flow
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl LineSettings {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self::new(default_baud_rate())
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// How the reader loop retries after read failures
///
/// The default retries immediately and forever. A non-zero
/// `initial_backoff_ms` doubles the delay after each consecutive failure up
/// to `max_backoff_ms`; `max_consecutive_failures` makes the loop give up.
/// A successfully read chunk resets the failure count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub initial_backoff_ms: u64,
    #[serde(default)]
    pub max_backoff_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
}

impl RetryPolicy {
    /// Retry immediately, never give up
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Exponential backoff between `initial` and `max`
    pub fn backoff(initial: Duration, max: Duration) -> Self {
        Self {
            initial_backoff_ms: initial.as_millis() as u64,
            max_backoff_ms: max.as_millis() as u64,
            max_consecutive_failures: None,
        }
    }

    /// Give up after `failures` consecutive read failures
    pub fn with_max_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = Some(failures);
        self
    }

    /// Delay before retrying after the `failures`-th consecutive failure
    pub fn delay_for(&self, failures: u32) -> Duration {
        if self.initial_backoff_ms == 0 || failures == 0 {
            return Duration::ZERO;
        }
        let shift = (failures - 1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        let cap = self.max_backoff_ms.max(self.initial_backoff_ms);
        Duration::from_millis(delay.min(cap))
    }

    /// Whether `failures` consecutive failures mean the transport is unusable
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures
            .is_some_and(|max| failures >= max)
    }
}
