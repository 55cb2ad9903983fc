//! # Register Decoding
//!
//! Turns a raw register block into a [`RegisterValue`] according to the
//! encoding tag of a register-map row.
//!
//! ## Supported Encodings
//!
//! | Tag | Bits | Aliases |
//! |-----|------|---------|
//! | CHAR | length × 16 | string, str |
//! | U8 | 8 | uint8, byte |
//! | U16 | 16 | uint16, word |
//! | U32 | 32 | uint32, dword |
//! | U64 | 64 | uint64, qword |
//! | S8 | 8 | i8, int8 |
//! | S16 | 16 | i16, int16, short |
//! | S32 | 32 | i32, int32, long |
//! | S64 | 64 | i64, int64, longlong |
//! | U / S | length × 16 | |
//!
//! Numeric values are read from the leading bytes of the block, multiplied
//! by the row multiplier and rounded to three decimal places.

use std::fmt;

use thiserror::Error;

use crate::bytes::{leading, regs_to_bytes};
use crate::constants::{MSG_DECODE_FAILED, MSG_FORMAT_NOT_SUPPORTED};
use crate::value::RegisterValue;

/// Encoding tag of a register-map row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    Char,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    /// Bare `U`: unsigned, width taken from the register count
    GuessUnsigned,
    /// Bare `S`: signed, width taken from the register count
    GuessSigned,
    /// Tag not understood; decoding always fails
    Unsupported(String),
}

impl Encoding {
    /// Parse an encoding tag, case-insensitively.
    ///
    /// Unknown tags are kept as [`Encoding::Unsupported`] so the row can
    /// still be reported.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "char" | "string" | "str" => Self::Char,
            "u8" | "uint8" | "byte" => Self::U8,
            "u16" | "uint16" | "word" => Self::U16,
            "u32" | "uint32" | "dword" => Self::U32,
            "u64" | "uint64" | "qword" => Self::U64,
            "s8" | "i8" | "int8" => Self::S8,
            "s16" | "i16" | "int16" | "short" => Self::S16,
            "s32" | "i32" | "int32" | "long" => Self::S32,
            "s64" | "i64" | "int64" | "longlong" => Self::S64,
            "u" => Self::GuessUnsigned,
            "s" => Self::GuessSigned,
            _ => Self::Unsupported(tag.trim().to_string()),
        }
    }

    /// Fixed bit width of a numeric encoding.
    ///
    /// `None` for `Char`, the guess variants and unsupported tags.
    pub fn bit_width(&self) -> Option<usize> {
        match self {
            Self::U8 | Self::S8 => Some(8),
            Self::U16 | Self::S16 => Some(16),
            Self::U32 | Self::S32 => Some(32),
            Self::U64 | Self::S64 => Some(64),
            _ => None,
        }
    }

    /// Replace a guess variant with the concrete encoding implied by
    /// `length` registers.
    pub fn resolve(&self, length: u16) -> Result<Encoding, DecodeFailure> {
        let signed = match self {
            Self::GuessUnsigned => false,
            Self::GuessSigned => true,
            Self::Unsupported(tag) => {
                return Err(DecodeFailure::UnsupportedFormat { tag: tag.clone() })
            }
            other => return Ok(other.clone()),
        };

        match (usize::from(length) * 16, signed) {
            (16, false) => Ok(Self::U16),
            (32, false) => Ok(Self::U32),
            (64, false) => Ok(Self::U64),
            (16, true) => Ok(Self::S16),
            (32, true) => Ok(Self::S32),
            (64, true) => Ok(Self::S64),
            (bits, _) => Err(DecodeFailure::UnsupportedFormat {
                tag: format!("{}{}", if signed { "S" } else { "U" }, bits),
            }),
        }
    }

    /// Canonical tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Char => "CHAR",
            Self::U8 => "U8",
            Self::U16 => "U16",
            Self::U32 => "U32",
            Self::U64 => "U64",
            Self::S8 => "S8",
            Self::S16 => "S16",
            Self::S32 => "S32",
            Self::S64 => "S64",
            Self::GuessUnsigned => "U",
            Self::GuessSigned => "S",
            Self::Unsupported(tag) => tag,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a register block could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    /// The encoding tag (or guessed width) has no decoder
    #[error("format {tag:?} not supported")]
    UnsupportedFormat { tag: String },

    /// Fewer bits available than the encoding needs
    #[error("{needed_bits} bits needed, {available_bits} available (raw {raw:?})")]
    Truncated {
        needed_bits: usize,
        available_bits: usize,
        /// Best-effort text rendering of the bytes that were available
        raw: String,
    },
}

impl DecodeFailure {
    /// Symbolic message written to the result stream
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => MSG_FORMAT_NOT_SUPPORTED,
            Self::Truncated { .. } => MSG_DECODE_FAILED,
        }
    }

    /// Raw diagnostic for truncated blocks
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::UnsupportedFormat { .. } => None,
            Self::Truncated { raw, .. } => Some(raw),
        }
    }
}

/// Round to three decimal places.
#[inline]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Interpret bytes as text, dropping trailing NUL padding and whitespace.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Decode a register block.
///
/// # Arguments
/// * `registers` - Raw register values from the read
/// * `encoding` - Encoding tag of the row
/// * `length` - Register count declared by the row
/// * `multiplier` - Scale factor for numeric encodings
///
/// Unsupported tags fail before any register is looked at. A block that
/// is too short for the encoding fails with [`DecodeFailure::Truncated`].
///
/// # Example
///
/// ```rust
/// use modbus_poller::{decode, Encoding, RegisterValue};
///
/// let value = decode(&[0x0001, 0x86A0], &Encoding::U32, 2, 0.01).unwrap();
/// assert_eq!(value, RegisterValue::Number(1000.0));
/// ```
pub fn decode(
    registers: &[u16],
    encoding: &Encoding,
    length: u16,
    multiplier: f64,
) -> Result<RegisterValue, DecodeFailure> {
    let encoding = encoding.resolve(length)?;

    let usable = registers.len().min(usize::from(length));
    let bytes = regs_to_bytes(&registers[..usable]);
    let needed_bits = encoding.bit_width().unwrap_or(usize::from(length) * 16);

    let truncated = || DecodeFailure::Truncated {
        needed_bits,
        available_bits: bytes.len() * 8,
        raw: bytes_to_text(&bytes),
    };

    if bytes.len() * 8 < needed_bits || needed_bits == 0 {
        return Err(truncated());
    }

    let raw: f64 = match encoding {
        Encoding::Char => return Ok(RegisterValue::Text(bytes_to_text(&bytes))),
        Encoding::U8 => f64::from(bytes[0]),
        Encoding::S8 => f64::from(bytes[0] as i8),
        Encoding::U16 => f64::from(u16::from_be_bytes(leading(&bytes).ok_or_else(truncated)?)),
        Encoding::S16 => f64::from(i16::from_be_bytes(leading(&bytes).ok_or_else(truncated)?)),
        Encoding::U32 => f64::from(u32::from_be_bytes(leading(&bytes).ok_or_else(truncated)?)),
        Encoding::S32 => f64::from(i32::from_be_bytes(leading(&bytes).ok_or_else(truncated)?)),
        Encoding::U64 => u64::from_be_bytes(leading(&bytes).ok_or_else(truncated)?) as f64,
        Encoding::S64 => i64::from_be_bytes(leading(&bytes).ok_or_else(truncated)?) as f64,
        Encoding::GuessUnsigned | Encoding::GuessSigned | Encoding::Unsupported(_) => {
            // resolve() never returns these
            return Err(DecodeFailure::UnsupportedFormat {
                tag: encoding.as_str().to_string(),
            });
        }
    };

    Ok(RegisterValue::Number(round3(raw * multiplier)))
}

// ============================================================================
// Tests
// ============================================================================
