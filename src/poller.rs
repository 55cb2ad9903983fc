//! # Polling Engine
//!
//! Drives passes over the register map. Each register is read, timed,
//! decoded and emitted before the next one starts; the device is a
//! single request/response endpoint and never sees two reads in flight.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Connecting → ConnectedIdle → Reading → Decoding → Emitting
//!                          ↑             ↑                    │
//!                          │             └── next register ───┤
//!                          └────────────── next pass ─────────┘
//!
//! any fatal error, or the end of a single pass → Stopped
//! ```
//!
//! ## Failure Handling
//!
//! | Failure | Record | Counts as error | Retried |
//! |---------|--------|-----------------|---------|
//! | Connection fault | none | yes | same register, after reconnect |
//! | Device decline | `REGISTER NOT FOUND` / `I/O ERROR (TIMEOUT)` | yes | no |
//! | Decode failure | `DECODE FAILED` / `FORMAT NOT SUPPORTED` | yes | no |
//! | Unknown function | `FUNCTION NOT SUPPORTED` | yes | no read issued |
//!
//! Reaching the consecutive-failure ceiling or failing the initial connect
//! stops the engine. The connection is closed and the closing diagnostic
//! written on every way out of [`PollingEngine::run`].

use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::client::Connector;
use crate::codec::decode;
use crate::config::PollerConfig;
use crate::connection::{ConnectionManager, ReadOutcome};
use crate::constants::MSG_FUNCTION_NOT_SUPPORTED;
use crate::error::{PollerError, PollerResult};
use crate::metrics::{MetricsTracker, OperationTimer};
use crate::register_map::{RegisterSource, RegisterSpec};
use crate::sink::{PollRecord, ResultSink, Timing};

/// Where the engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Connecting,
    ConnectedIdle,
    Reading,
    Decoding,
    Emitting,
    Stopped,
}

/// Outcome of one pass over the register map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub registers: usize,
    pub readings: usize,
    pub failures: usize,
}

/// Totals after the engine stopped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub passes: u64,
    pub error_count: u64,
    pub running_average_ms: f64,
}

/// Polls registers from one device into a [`ResultSink`].
///
/// # Example
///
/// ```rust,no_run
/// use modbus_poller::{
///     FileRegisterSource, DelimitedSink, PollerConfig, PollingEngine, TcpConnector,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = PollerConfig::new("192.168.1.20", "registers.csv");
///     let connector = TcpConnector::new(&config.host, config.port, config.connect_timeout);
///     let source = FileRegisterSource::new(&config.register_map);
///     let sink = DelimitedSink::new(std::io::stdout(), config.separator);
///
///     let mut engine = PollingEngine::from_config(&config, connector, source, sink)?;
///     let summary = engine.run().await?;
///     eprintln!("{} errors", summary.error_count);
///     Ok(())
/// }
/// ```
pub struct PollingEngine<C: Connector, R: RegisterSource, S: ResultSink> {
    connection: ConnectionManager<C>,
    source: R,
    sink: S,
    metrics: MetricsTracker,
    register_delay: Duration,
    loop_delay: Option<Duration>,
    state: EngineState,
    passes: u64,
    closed: bool,
}

impl<C: Connector, R: RegisterSource, S: ResultSink> PollingEngine<C, R, S> {
    /// Single-pass engine with no delay between registers.
    pub fn new(connection: ConnectionManager<C>, source: R, sink: S, metrics: MetricsTracker) -> Self {
        Self {
            connection,
            source,
            sink,
            metrics,
            register_delay: Duration::ZERO,
            loop_delay: None,
            state: EngineState::Idle,
            passes: 0,
            closed: false,
        }
    }

    /// Build an engine from a validated configuration.
    pub fn from_config(config: &PollerConfig, connector: C, source: R, sink: S) -> PollerResult<Self> {
        config.validate().map_err(PollerError::Config)?;
        let metrics = config.metrics().map_err(PollerError::Config)?;

        let connection = ConnectionManager::new(connector, config.unit_id)
            .with_max_failures(config.max_consecutive_failures)
            .with_reconnect_delay(config.reconnect_delay);

        Ok(Self::new(connection, source, sink, metrics)
            .with_register_delay(config.register_delay)
            .with_loop_delay(config.loop_delay))
    }

    pub fn with_register_delay(mut self, delay: Duration) -> Self {
        self.register_delay = delay;
        self
    }

    /// Loop forever with `delay` between passes, or stop after one pass with `None`.
    pub fn with_loop_delay(mut self, delay: Option<Duration>) -> Self {
        self.loop_delay = delay;
        self
    }

    /// Connect, then poll until the single pass ends or a fatal error occurs.
    ///
    /// The connection is always closed before this returns. When polling
    /// failed, that error is returned even if closing failed too.
    pub async fn run(&mut self) -> PollerResult<RunSummary> {
        let outcome = self.run_inner().await;
        let closed = self.shutdown().await;
        outcome.and(closed).map(|_| self.summary())
    }

    async fn run_inner(&mut self) -> PollerResult<()> {
        self.state = EngineState::Connecting;
        self.sink.comment(&format!(
            "connecting to {} id {}",
            self.connection.target(),
            self.connection.unit_id()
        ))?;

        let timer = OperationTimer::start();
        self.connection.connect().await?;
        self.sink.comment(&format!(
            "connection established in {}ms",
            timer.elapsed_ms().round() as u64
        ))?;
        self.state = EngineState::ConnectedIdle;

        loop {
            let pass = self.poll_once().await?;
            info!(
                "Pass {} done: {} registers, {} readings, {} failures",
                self.passes, pass.registers, pass.readings, pass.failures
            );

            match self.loop_delay {
                Some(delay) => {
                    self.state = EngineState::Idle;
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Run one pass over a freshly loaded register map.
    pub async fn poll_once(&mut self) -> PollerResult<PassSummary> {
        let specs = self.source.load().await?;
        debug!("Polling {} registers from {}", specs.len(), self.source.describe());

        let mut summary = PassSummary {
            registers: specs.len(),
            ..PassSummary::default()
        };

        for (index, spec) in specs.iter().enumerate() {
            if index > 0 && !self.register_delay.is_zero() {
                tokio::time::sleep(self.register_delay).await;
            }

            if self.poll_register(spec).await? {
                summary.readings += 1;
            } else {
                summary.failures += 1;
            }
            self.state = EngineState::ConnectedIdle;
        }

        self.passes += 1;
        Ok(summary)
    }

    /// Read, decode and emit one register. Returns whether a value was emitted.
    async fn poll_register(&mut self, spec: &RegisterSpec) -> PollerResult<bool> {
        let Some(function) = spec.function.modbus_function() else {
            warn!("Register {}: function {} not supported", spec.address, spec.function);
            let error_count = self.metrics.increment_errors();
            self.emit_failure(spec.address, MSG_FUNCTION_NOT_SUPPORTED, None, error_count, None)?;
            return Ok(false);
        };

        loop {
            self.state = EngineState::Reading;
            // Reconnecting happens outside the timed region.
            let attempt = match self.connection.ensure_connected().await {
                Ok(Some(fault)) => Ok((ReadOutcome::ConnectionFault(fault), 0.0)),
                Ok(None) => {
                    let timer = OperationTimer::start();
                    self.connection
                        .read(function, spec.address, spec.length)
                        .await
                        .map(|outcome| (outcome, timer.elapsed_ms()))
                }
                Err(fatal) => Err(fatal),
            };
            let (outcome, latency_ms) = match attempt {
                Ok(attempt) => attempt,
                Err(fatal) => {
                    self.metrics.increment_errors();
                    return Err(fatal);
                }
            };

            let words = match outcome {
                ReadOutcome::Block(words) => words,
                ReadOutcome::Declined(e) => {
                    warn!("Register {}: {}", spec.address, e);
                    let error_count = self.metrics.increment_errors();
                    self.state = EngineState::Emitting;
                    self.emit_failure(spec.address, e.symbol(), None, error_count, None)?;
                    return Ok(false);
                }
                ReadOutcome::ConnectionFault(e) => {
                    let error_count = self.metrics.increment_errors();
                    warn!(
                        "Register {}: connection fault ({} errors so far), retrying: {}",
                        spec.address, error_count, e
                    );
                    continue;
                }
            };

            let running_average_ms = self.metrics.record(latency_ms);
            self.state = EngineState::Decoding;
            let decoded = decode(&words, &spec.encoding, spec.length, spec.multiplier);

            self.state = EngineState::Emitting;
            return match decoded {
                Ok(value) => {
                    debug!("Register {} = {} ({:.2}ms)", spec.address, value, latency_ms);
                    self.sink.emit(&PollRecord::Reading {
                        timestamp: Local::now(),
                        address: spec.address,
                        value,
                        latency_ms,
                        running_average_ms,
                        error_count: self.metrics.error_count(),
                    })?;
                    Ok(true)
                }
                Err(failure) => {
                    warn!(
                        "Register {} ({} x{}): {}",
                        spec.address, spec.encoding, spec.length, failure
                    );
                    let error_count = self.metrics.increment_errors();
                    let timing = Timing {
                        latency_ms,
                        running_average_ms,
                    };
                    self.emit_failure(
                        spec.address,
                        failure.symbol(),
                        Some(timing),
                        error_count,
                        failure.raw().map(str::to_string),
                    )?;
                    Ok(false)
                }
            };
        }
    }

    fn emit_failure(
        &mut self,
        address: u16,
        message: &'static str,
        timing: Option<Timing>,
        error_count: u64,
        raw: Option<String>,
    ) -> PollerResult<()> {
        self.sink.emit(&PollRecord::Failure {
            timestamp: Local::now(),
            address,
            message,
            timing,
            error_count,
            raw,
        })?;
        Ok(())
    }

    /// Close the connection and write the closing diagnostic.
    ///
    /// Only the first call has any effect.
    pub async fn shutdown(&mut self) -> PollerResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connection.close().await;
        self.state = EngineState::Stopped;

        self.sink.comment(&format!(
            "connection closed: average latency {:.2}ms, {} errors",
            self.metrics.running_average_ms(),
            self.metrics.error_count()
        ))?;
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            passes: self.passes,
            error_count: self.metrics.error_count(),
            running_average_ms: self.metrics.running_average_ms(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }
}
