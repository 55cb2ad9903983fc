//! # Modbus Poller - Continuous Register Polling Engine
//!
//! Reads a register map, polls the listed registers from one Modbus TCP
//! device, decodes each block into a typed value, tracks latency and
//! error counts, and writes one result line per register.
//!
//! ## Features
//!
//! - **Sequential Polling**: One request in flight, optional delays between registers and passes
//! - **Live Register Map**: The map is re-read before every pass
//! - **Typed Decoding**: Big-endian `U8`..`U64`, `S8`..`S64`, `CHAR` and width-guessing `U`/`S`
//! - **Connection Management**: Transparent reconnects with a consecutive-failure ceiling
//! - **Latency Tracking**: Exponential moving average of request latency
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Register Map Value |
//! |------|----------|--------------------|
//! | 0x03 | Read Holding Registers | `3` |
//! | 0x04 | Read Input Registers | `4` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_poller::{
//!     DelimitedSink, Encoding, MetricsTracker, ConnectionManager, PollingEngine,
//!     RegisterSpec, Separator, TcpConnector,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new("127.0.0.1", 502, Duration::from_secs(5));
//!     let registers = vec![
//!         RegisterSpec::input(0, 1, Encoding::U16).with_multiplier(0.1),
//!         RegisterSpec::holding(100, 2, Encoding::S32),
//!     ];
//!     let sink = DelimitedSink::new(std::io::stdout(), Separator::Comma);
//!
//!     let mut engine = PollingEngine::new(
//!         ConnectionManager::new(connector, 1),
//!         registers,
//!         sink,
//!         MetricsTracker::default(),
//!     );
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Protocol modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants and poller defaults
pub mod constants;

/// Stack-allocated PDU with fixed array
pub mod pdu;

/// Modbus protocol definitions and message handling
pub mod protocol;

/// Network transport layer for Modbus TCP
pub mod transport;

/// Modbus client implementations and connectors
pub mod client;

// ============================================================================
// Polling modules
// ============================================================================

/// Decoded register values
pub mod value;

/// Register/byte conversions
pub mod bytes;

/// Register block decoding
pub mod codec;

/// Register map parsing and sources
pub mod register_map;

/// Latency and error accounting
pub mod metrics;

/// Connection lifecycle and retry policy
pub mod connection;

/// Result stream records and writers
pub mod sink;

/// Poller configuration
pub mod config;

/// Polling engine
pub mod poller;

/// Tracing setup for the binary
pub mod logging;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_poller::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::{Connector, GenericModbusClient, ModbusClient, ModbusTcpClient, TcpConnector};

// === Error handling ===
pub use error::{ModbusError, ModbusResult, PollerError, PollerResult};

// === Core types ===
pub use protocol::{ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};
pub use value::RegisterValue;

// === Polling ===
pub use codec::{decode, DecodeFailure, Encoding};
pub use config::PollerConfig;
pub use connection::{ConnectionManager, ConnectionState, ReadOutcome};
pub use metrics::{MetricsSnapshot, MetricsTracker, OperationTimer};
pub use poller::{EngineState, PassSummary, PollingEngine, RunSummary};
pub use register_map::{
    parse_register_map, FileRegisterSource, RegisterFunction, RegisterSource, RegisterSpec,
};
pub use sink::{DelimitedSink, MemorySink, PollRecord, ResultSink, Separator, Timing};

// === Monitoring ===
pub use transport::{ModbusTransport, TcpTransport, TransportStats};

// === Protocol limits (commonly needed constants) ===
pub use constants::{DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, MAX_PDU_SIZE, MAX_READ_REGISTERS};

// === Logging ===
pub use logging::{init_tracing, LogFormat};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Modbus Poller v{} - continuous Modbus register poller", VERSION)
}
