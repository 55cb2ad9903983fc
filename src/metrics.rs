//! Latency and error accounting for the polling engine.

use tokio::time::Instant;

use crate::constants::{DEFAULT_INITIAL_AVERAGE_MS, DEFAULT_SMOOTHING_FACTOR};
use crate::error::{ModbusError, ModbusResult};

/// Running latency average and cumulative error count.
///
/// The average is an exponential moving average:
///
/// ```text
/// average' = factor * latency + (1 - factor) * average
/// ```
///
/// The error count only ever grows.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    factor: f64,
    running_average_ms: f64,
    error_count: u64,
    samples: u64,
}

/// Point-in-time copy of the tracker state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub running_average_ms: f64,
    pub error_count: u64,
    pub samples: u64,
}

impl MetricsTracker {
    /// Create a tracker with the given smoothing factor and seed average.
    ///
    /// `factor` must lie in `(0, 1]` and `seed_ms` must be a finite,
    /// non-negative number.
    pub fn new(factor: f64, seed_ms: f64) -> ModbusResult<Self> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ModbusError::configuration(format!(
                "smoothing factor must be in (0, 1], got {}",
                factor
            )));
        }
        if !seed_ms.is_finite() || seed_ms < 0.0 {
            return Err(ModbusError::configuration(format!(
                "initial average must be a non-negative number, got {}",
                seed_ms
            )));
        }

        Ok(Self {
            factor,
            running_average_ms: seed_ms,
            error_count: 0,
            samples: 0,
        })
    }

    /// Fold a latency sample into the average and return the new average.
    pub fn record(&mut self, latency_ms: f64) -> f64 {
        self.running_average_ms =
            self.factor * latency_ms + (1.0 - self.factor) * self.running_average_ms;
        self.samples += 1;
        self.running_average_ms
    }

    /// Count one failed attempt and return the new total.
    pub fn increment_errors(&mut self) -> u64 {
        self.error_count += 1;
        self.error_count
    }

    pub fn running_average_ms(&self) -> f64 {
        self.running_average_ms
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            running_average_ms: self.running_average_ms,
            error_count: self.error_count,
            samples: self.samples,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self {
            factor: DEFAULT_SMOOTHING_FACTOR,
            running_average_ms: DEFAULT_INITIAL_AVERAGE_MS,
            error_count: 0,
            samples: 0,
        }
    }
}

/// Timer for a single operation, on the runtime clock.
#[derive(Debug, Clone, Copy)]
pub struct OperationTimer {
    start: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since [`OperationTimer::start`], with sub-millisecond precision
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
