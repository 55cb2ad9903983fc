//! # Poller Configuration
//!
//! Everything the engine needs to know before the first connect.
//!
//! | Setting | Default |
//! |---------|---------|
//! | port | 502 |
//! | unit id | 1 |
//! | connect/request timeout | 5 s |
//! | delay between registers | 100 ms |
//! | delay between passes | none (single pass) |
//! | smoothing factor | 0.05 |
//! | initial average | 100 ms |
//! | consecutive failure ceiling | 5 |
//! | reconnect delay | 0 |
//! | separator | tab |

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_INITIAL_AVERAGE_MS, DEFAULT_REGISTER_DELAY_MS, DEFAULT_SMOOTHING_FACTOR,
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, MAX_CONSECUTIVE_FAILURES,
};
use crate::error::{ModbusError, ModbusResult};
use crate::metrics::MetricsTracker;
use crate::protocol::SlaveId;
use crate::sink::Separator;

/// Poller settings.
///
/// # Example
///
/// ```rust
/// use modbus_poller::PollerConfig;
/// use std::time::Duration;
///
/// let config = PollerConfig::new("192.168.1.20", "registers.csv")
///     .with_unit_id(3)
///     .with_loop_delay(Some(Duration::from_secs(2)));
///
/// assert_eq!(config.port, 502);
/// assert!(config.is_looping());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Device host name or IP address
    pub host: String,
    /// Path of the register map
    pub register_map: PathBuf,
    pub port: u16,
    pub unit_id: SlaveId,
    /// Timeout for connecting and for each request
    pub connect_timeout: Duration,
    /// Pause after each register
    pub register_delay: Duration,
    /// Pause between passes; `None` stops after one pass
    pub loop_delay: Option<Duration>,
    pub smoothing_factor: f64,
    pub initial_average_ms: f64,
    pub max_consecutive_failures: u32,
    /// Pause after a connection fault before retrying
    pub reconnect_delay: Duration,
    pub separator: Separator,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            register_map: PathBuf::new(),
            port: DEFAULT_TCP_PORT,
            unit_id: DEFAULT_UNIT_ID,
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            register_delay: Duration::from_millis(DEFAULT_REGISTER_DELAY_MS),
            loop_delay: None,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            initial_average_ms: DEFAULT_INITIAL_AVERAGE_MS,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            reconnect_delay: Duration::ZERO,
            separator: Separator::Tab,
        }
    }
}

impl PollerConfig {
    /// Defaults for the given device and register map.
    pub fn new(host: impl Into<String>, register_map: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            register_map: register_map.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_unit_id(mut self, unit_id: SlaveId) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_register_delay(mut self, delay: Duration) -> Self {
        self.register_delay = delay;
        self
    }

    /// Enable looping with the given pause between passes, or disable it with `None`.
    pub fn with_loop_delay(mut self, delay: Option<Duration>) -> Self {
        self.loop_delay = delay;
        self
    }

    pub fn with_smoothing_factor(mut self, factor: f64) -> Self {
        self.smoothing_factor = factor;
        self
    }

    pub fn with_initial_average_ms(mut self, average_ms: f64) -> Self {
        self.initial_average_ms = average_ms;
        self
    }

    pub fn with_max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn is_looping(&self) -> bool {
        self.loop_delay.is_some()
    }

    /// `host:port` of the device
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the metrics tracker described by this configuration.
    pub fn metrics(&self) -> ModbusResult<MetricsTracker> {
        MetricsTracker::new(self.smoothing_factor, self.initial_average_ms)
    }

    /// Check the settings for values the engine cannot work with.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.host.trim().is_empty() {
            return Err(ModbusError::configuration("host must not be empty"));
        }
        if self.register_map.as_os_str().is_empty() {
            return Err(ModbusError::configuration("register map path must not be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ModbusError::configuration("timeout must be greater than zero"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ModbusError::configuration(
                "consecutive failure ceiling must be at least 1",
            ));
        }
        if matches!(self.separator.as_char(), '\n' | '\r') {
            return Err(ModbusError::configuration("separator must not be a line break"));
        }
        self.metrics().map(|_| ())
    }
}
