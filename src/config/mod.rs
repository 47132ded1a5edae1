//! Peripheral configuration.
//!
//! Platform-independent settings for the hotspot peripheral. Defaults match
//! the wire protocol; `from_env` lets the host simulator and test rigs tune
//! timings without recompiling.
//!
//! # Example
//!
//! ```
//! use hotspot_ble::config::{PeripheralConfig, RetryConfig};
//! use std::time::Duration;
//!
//! let config = PeripheralConfig {
//!     retry: RetryConfig::with_base_delay(Duration::from_millis(500)),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::time::Duration;

/// Default BLE advertisement name.
pub const DEFAULT_DEVICE_NAME: &str = "Hotspot-Beacon";

/// Default base delay between credential fetch attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(3);

/// Upper bound on the base delay. Attempt 3 waits three times this.
pub const MAX_BASE_DELAY: Duration = Duration::from_secs(60);

/// Default depth of the link event queue feeding the runtime.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 16;

/// Maximum advertisement name length. The name rides in the scan response,
/// which is 31 bytes minus the 2-byte AD header.
pub const MAX_DEVICE_NAME_LEN: usize = 29;

/// Environment variable overriding the advertisement name.
pub const ENV_DEVICE_NAME: &str = "HOTSPOT_BLE_DEVICE_NAME";

/// Environment variable overriding the retry base delay (milliseconds).
pub const ENV_RETRY_BASE_MS: &str = "HOTSPOT_BLE_RETRY_BASE_MS";

/// Environment variable overriding the event queue depth.
pub const ENV_EVENT_QUEUE: &str = "HOTSPOT_BLE_EVENT_QUEUE";

/// Timing for the credential retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempt `n` waits `n * base_delay` before it runs.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with a custom base delay.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Delay to wait before running `attempt` (1-based). Saturates at
    /// `Duration::MAX` for base delays that were never validated.
    pub fn delay_for(&self, attempt: u8) -> Duration {
        self.base_delay
            .checked_mul(u32::from(attempt))
            .unwrap_or(Duration::MAX)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay",
                reason: "must be > 0".to_string(),
            });
        }
        if self.base_delay > MAX_BASE_DELAY {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay",
                reason: format!("must be <= {}s", MAX_BASE_DELAY.as_secs()),
            });
        }
        Ok(())
    }
}

/// Top-level peripheral configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Name placed in the advertisement.
    pub device_name: String,
    /// Credential retry timing.
    pub retry: RetryConfig,
    /// Capacity of the link event channel.
    pub event_queue_depth: usize,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            retry: RetryConfig::default(),
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }
}

impl PeripheralConfig {
    /// Load defaults overlaid with `HOTSPOT_BLE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load defaults overlaid with values from `lookup`.
    ///
    /// Split out from [`Self::from_env`] so tests don't have to mutate the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_DEVICE_NAME) {
            config.device_name = name;
        }

        if let Some(raw) = lookup(ENV_RETRY_BASE_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Malformed {
                key: ENV_RETRY_BASE_MS,
                value: raw.clone(),
            })?;
            config.retry.base_delay = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(ENV_EVENT_QUEUE) {
            config.event_queue_depth = raw.trim().parse().map_err(|_| ConfigError::Malformed {
                key: ENV_EVENT_QUEUE,
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "device_name",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(ConfigError::InvalidValue {
                field: "device_name",
                reason: format!(
                    "{} bytes exceeds advertisement limit of {}",
                    self.device_name.len(),
                    MAX_DEVICE_NAME_LEN
                ),
            });
        }
        if self.event_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_queue_depth",
                reason: "must be > 0".to_string(),
            });
        }
        self.retry.validate()
    }
}

/// Errors that can occur while building configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment value could not be parsed.
    Malformed { key: &'static str, value: String },
    /// A field is out of range.
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { key, value } => write!(f, "malformed {}: {:?}", key, value),
            Self::InvalidValue { field, reason } => write!(f, "invalid {}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {}
