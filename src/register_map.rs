//! # Register Map
//!
//! The register map is a flat comma-separated file, one register per row:
//!
//! ```text
//! # function, address, length, multiplier, encoding
//! 4, 0,  1, 0.1,  U16
//! 3, 10, 2, 0.01, S32
//! 4, 40, 8, 1,    CHAR
//! ```
//!
//! Rows with four fields leave out the function and read input registers.
//! Blank lines and lines starting with `#` are ignored.
//!
//! The map is re-read at the start of every pass, so it can be edited
//! while the poller runs.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::Encoding;
use crate::error::{PollerError, PollerResult};
use crate::protocol::ModbusFunction;

/// Read operation requested by a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterFunction {
    /// Function 3
    ReadHolding,
    /// Function 4
    ReadInput,
    /// Anything else, kept verbatim for diagnostics
    Unsupported(String),
}

impl RegisterFunction {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<u8>().map(ModbusFunction::from_u8) {
            Ok(Ok(ModbusFunction::ReadHoldingRegisters)) => Self::ReadHolding,
            Ok(Ok(ModbusFunction::ReadInputRegisters)) => Self::ReadInput,
            _ => Self::Unsupported(raw.to_string()),
        }
    }

    /// Wire function, or `None` if this client cannot issue it
    pub fn modbus_function(&self) -> Option<ModbusFunction> {
        match self {
            Self::ReadHolding => Some(ModbusFunction::ReadHoldingRegisters),
            Self::ReadInput => Some(ModbusFunction::ReadInputRegisters),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for RegisterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadHolding => f.write_str("3"),
            Self::ReadInput => f.write_str("4"),
            Self::Unsupported(raw) => f.write_str(raw),
        }
    }
}

/// One register to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    pub function: RegisterFunction,
    /// Start address
    pub address: u16,
    /// Number of 16-bit registers to read, at least 1
    pub length: u16,
    pub multiplier: f64,
    pub encoding: Encoding,
}

impl RegisterSpec {
    pub fn new(function: RegisterFunction, address: u16, length: u16, encoding: Encoding) -> Self {
        Self {
            function,
            address,
            length,
            multiplier: 1.0,
            encoding,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Input register row (function 4)
    pub fn input(address: u16, length: u16, encoding: Encoding) -> Self {
        Self::new(RegisterFunction::ReadInput, address, length, encoding)
    }

    /// Holding register row (function 3)
    pub fn holding(address: u16, length: u16, encoding: Encoding) -> Self {
        Self::new(RegisterFunction::ReadHolding, address, length, encoding)
    }
}

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("expected 4 or 5 fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid address {raw:?}")]
    Address { raw: String },

    #[error("invalid length {raw:?}")]
    Length { raw: String },
}

/// Parse a single line of the register map.
///
/// Returns `Ok(None)` for comments and blank lines.
pub fn parse_row(line: &str) -> Result<Option<RegisterSpec>, RowError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let (function, rest) = match fields.len() {
        5 => (RegisterFunction::parse(fields[0]), &fields[1..]),
        4 => (RegisterFunction::ReadInput, &fields[..]),
        found => return Err(RowError::FieldCount { found }),
    };

    let address = rest[0].parse::<u16>().map_err(|_| RowError::Address {
        raw: rest[0].to_string(),
    })?;
    let length = rest[1]
        .parse::<u16>()
        .ok()
        .filter(|&len| len > 0)
        .ok_or_else(|| RowError::Length {
            raw: rest[1].to_string(),
        })?;
    let multiplier = rest[2]
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite())
        .unwrap_or(1.0);

    Ok(Some(RegisterSpec {
        function,
        address,
        length,
        multiplier,
        encoding: Encoding::parse(rest[3]),
    }))
}

/// Parse a whole register map, skipping malformed rows.
pub fn parse_register_map(text: &str) -> Vec<RegisterSpec> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| match parse_row(line) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("Register map line {}: {}, row skipped", index + 1, e);
                None
            }
        })
        .collect()
}

/// Supplies the register map at the start of each pass.
pub trait RegisterSource: Send {
    /// Load the current register map.
    fn load(&mut self) -> impl std::future::Future<Output = PollerResult<Vec<RegisterSpec>>> + Send;

    /// Where the map comes from, for diagnostics.
    fn describe(&self) -> String;
}

/// A fixed, in-memory register map
impl RegisterSource for Vec<RegisterSpec> {
    async fn load(&mut self) -> PollerResult<Vec<RegisterSpec>> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory registers", self.len())
    }
}

/// Register map read from a file on every pass.
#[derive(Debug, Clone)]
pub struct FileRegisterSource {
    path: PathBuf,
    last: Option<Vec<RegisterSpec>>,
}

impl FileRegisterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegisterSource for FileRegisterSource {
    async fn load(&mut self) -> PollerResult<Vec<RegisterSpec>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let specs = parse_register_map(&text);
                debug!("Loaded {} registers from {}", specs.len(), self.path.display());
                self.last = Some(specs.clone());
                Ok(specs)
            }
            Err(e) => match &self.last {
                Some(previous) => {
                    warn!(
                        "Cannot re-read register map {}: {}, reusing previous map",
                        self.path.display(),
                        e
                    );
                    Ok(previous.clone())
                }
                None => Err(PollerError::RegisterMap {
                    path: self.path.display().to_string(),
                    source: e,
                }),
            },
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
