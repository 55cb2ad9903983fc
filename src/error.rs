//! Error types for the poller
//!
//! Two layers of errors exist:
//!
//! - [`ModbusError`] describes a single failed interaction with the device
//!   (connect, request, response parsing) or invalid input data. Every
//!   `ModbusError` raised while polling is recoverable and stays local to
//!   the register that triggered it.
//! - [`PollerError`] is fatal. It is only produced by the connection
//!   manager and the polling engine and is propagated to the binary, which
//!   is the single place that terminates the process.

use thiserror::Error;

use crate::constants::{MSG_IO_TIMEOUT, MSG_REGISTER_NOT_FOUND};
use crate::protocol::ModbusException;

/// Result type for device interactions
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Result type for engine-level operations
pub type PollerResult<T> = Result<T, PollerError>;

/// Errors raised while talking to a Modbus device.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Socket level failure (reset, broken pipe, EOF)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection could not be established or was lost
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The device did not answer in time
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The device answered with an exception response
    #[error("Modbus exception: function={function:#04x}, {exception}")]
    Exception {
        function: u8,
        exception: ModbusException,
    },

    /// The device answered with something that does not match the request
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The byte stream can no longer be trusted (bad MBAP header, truncated frame)
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Invalid request parameters or payload
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Function code not supported by this client
    #[error("Invalid function code: {code:#04x}")]
    InvalidFunction { code: u8 },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an exception error from a raw exception code
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception {
            function,
            exception: ModbusException::from_code(code),
        }
    }

    /// Whether this error means the connection itself is unusable.
    ///
    /// Connection faults trigger a reconnect and count toward the
    /// consecutive-failure ceiling. Everything else is a decline by a
    /// reachable device and only affects the register being read.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connection { .. } | Self::Frame { .. }
        )
    }

    /// Whether the device failed to answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Symbolic message written to the result stream for a declined read.
    pub fn symbol(&self) -> &'static str {
        if self.is_timeout() {
            MSG_IO_TIMEOUT
        } else {
            MSG_REGISTER_NOT_FOUND
        }
    }
}

/// Conditions that stop the poller.
#[derive(Debug, Error)]
pub enum PollerError {
    /// The very first connection attempt failed
    #[error("cannot connect to {target}: {source}")]
    InitialConnect {
        target: String,
        #[source]
        source: ModbusError,
    },

    /// Too many connection-level read failures in a row
    #[error("giving up on {target} after {failures} consecutive connection failures: {source}")]
    FailureCeiling {
        target: String,
        failures: u32,
        #[source]
        source: ModbusError,
    },

    /// The register map could not be read on the first pass
    #[error("cannot read register map {path}: {source}")]
    RegisterMap {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    Config(#[source] ModbusError),

    /// The result stream could not be written
    #[error("cannot write results: {0}")]
    Output(#[from] std::io::Error),
}

impl PollerError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InitialConnect { .. } => 2,
            Self::FailureCeiling { .. } => 3,
            Self::RegisterMap { .. } | Self::Config(_) => 4,
            Self::Output(_) => 5,
        }
    }
}
