//! # Result Stream
//!
//! Every register of every pass produces exactly one [`PollRecord`]. The
//! default [`DelimitedSink`] writes one line per record:
//!
//! ```text
//! 2024-05-01 12:00:00.123	30	230.5	12.40	95.62	0
//! 2024-05-01 12:00:00.241	9999	REGISTER NOT FOUND	1
//! ```
//!
//! Successful reads carry `timestamp, address, value, latency, average,
//! errors`. Failures replace the value with a symbolic message and drop
//! the timing fields when no register block came back.
//!
//! Text that came from the device is written with control characters and
//! the separator replaced by a space, so one record is always one line.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Local};

use crate::value::RegisterValue;

/// Timestamp format used on the result stream
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Field separator of the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    Tab,
    Comma,
    Custom(char),
}

impl Separator {
    pub fn as_char(&self) -> char {
        match self {
            Separator::Tab => '\t',
            Separator::Comma => ',',
            Separator::Custom(c) => *c,
        }
    }
}

impl From<char> for Separator {
    fn from(c: char) -> Self {
        match c {
            '\t' => Separator::Tab,
            ',' => Separator::Comma,
            other => Separator::Custom(other),
        }
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Latency of a read that returned a register block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub latency_ms: f64,
    pub running_average_ms: f64,
}

/// One entry of the result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PollRecord {
    /// A register read and decoded successfully
    Reading {
        timestamp: DateTime<Local>,
        address: u16,
        value: RegisterValue,
        latency_ms: f64,
        running_average_ms: f64,
        error_count: u64,
    },
    /// A register that could not be read or decoded
    Failure {
        timestamp: DateTime<Local>,
        address: u16,
        /// Symbolic message such as `REGISTER NOT FOUND`
        message: &'static str,
        /// Present when a register block was received
        timing: Option<Timing>,
        error_count: u64,
        /// Best-effort text of the received bytes
        raw: Option<String>,
    },
}

impl PollRecord {
    pub fn address(&self) -> u16 {
        match self {
            PollRecord::Reading { address, .. } | PollRecord::Failure { address, .. } => *address,
        }
    }

    pub fn error_count(&self) -> u64 {
        match self {
            PollRecord::Reading { error_count, .. } | PollRecord::Failure { error_count, .. } => {
                *error_count
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PollRecord::Failure { .. })
    }

    /// Render the record with the given separator (no line terminator)
    pub fn format(&self, separator: Separator) -> String {
        let sep = separator.as_char();
        let mut fields: Vec<String> = Vec::with_capacity(7);
        match self {
            PollRecord::Reading {
                timestamp,
                address,
                value,
                latency_ms,
                running_average_ms,
                error_count,
            } => {
                fields.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
                fields.push(address.to_string());
                fields.push(match value {
                    RegisterValue::Text(text) => device_text(text, sep),
                    RegisterValue::Number(_) => value.to_string(),
                });
                fields.push(format!("{:.2}", latency_ms));
                fields.push(format!("{:.2}", running_average_ms));
                fields.push(error_count.to_string());
            }
            PollRecord::Failure {
                timestamp,
                address,
                message,
                timing,
                error_count,
                raw,
            } => {
                fields.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
                fields.push(address.to_string());
                fields.push(message.to_string());
                if let Some(timing) = timing {
                    fields.push(format!("{:.2}", timing.latency_ms));
                    fields.push(format!("{:.2}", timing.running_average_ms));
                }
                fields.push(error_count.to_string());
                if let Some(raw) = raw {
                    fields.push(device_text(raw, sep));
                }
            }
        }
        fields.join(&separator.to_string())
    }
}

/// Device-supplied text made safe for a single delimited field.
fn device_text(text: &str, separator: char) -> String {
    text.chars()
        .map(|c| if c.is_control() || c == separator { ' ' } else { c })
        .collect()
}

/// Receives the result stream.
pub trait ResultSink: Send {
    /// Write one record
    fn emit(&mut self, record: &PollRecord) -> io::Result<()>;

    /// Write a diagnostic comment line
    fn comment(&mut self, text: &str) -> io::Result<()>;
}

/// Writes records as separated text lines, flushing after each one.
pub struct DelimitedSink<W: Write> {
    writer: W,
    separator: Separator,
}

impl<W: Write> DelimitedSink<W> {
    pub fn new(writer: W, separator: Separator) -> Self {
        Self { writer, separator }
    }

    pub fn separator(&self) -> Separator {
        self.separator
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResultSink for DelimitedSink<W> {
    fn emit(&mut self, record: &PollRecord) -> io::Result<()> {
        writeln!(self.writer, "{}", record.format(self.separator))?;
        self.writer.flush()
    }

    fn comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "# {}", text)?;
        self.writer.flush()
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<PollRecord>,
    pub comments: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PollRecord> {
        self.records.iter().filter(|r| r.is_failure())
    }
}

impl ResultSink for MemorySink {
    fn emit(&mut self, record: &PollRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn comment(&mut self, text: &str) -> io::Result<()> {
        self.comments.push(text.to_string());
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn emit(&mut self, record: &PollRecord) -> io::Result<()> {
        (**self).emit(record)
    }

    fn comment(&mut self, text: &str) -> io::Result<()> {
        (**self).comment(text)
    }
}
