//! # Decoded Register Values
//!
//! What a register block turns into after decoding: a scaled number or a
//! piece of text.

use std::fmt;

/// A successfully decoded register value.
///
/// Numbers are already scaled by the register multiplier and rounded to
/// three decimal places, so `Display` prints the shortest exact form
/// (`230`, `49.98`, `-0.125`).
///
/// # Example
///
/// ```rust
/// use modbus_poller::RegisterValue;
///
/// let volts = RegisterValue::Number(230.0);
/// assert_eq!(volts.to_string(), "230");
/// assert_eq!(RegisterValue::from("SN-42").to_string(), "SN-42");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    /// Scaled numeric value
    Number(f64),
    /// Text decoded from a `CHAR` register block
    Text(String),
}

impl RegisterValue {
    /// Numeric value, if this is a number
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RegisterValue::Number(v) => Some(*v),
            RegisterValue::Text(_) => None,
        }
    }

    /// Text value, if this is text
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RegisterValue::Number(_) => None,
            RegisterValue::Text(s) => Some(s),
        }
    }

    /// Returns the type name as a string for logging/debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            RegisterValue::Number(_) => "number",
            RegisterValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Number(v) => write!(f, "{}", v),
            RegisterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RegisterValue {
    fn from(v: f64) -> Self {
        RegisterValue::Number(v)
    }
}

impl From<String> for RegisterValue {
    fn from(v: String) -> Self {
        RegisterValue::Text(v)
    }
}

impl From<&str> for RegisterValue {
    fn from(v: &str) -> Self {
        RegisterValue::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(RegisterValue::Number(1.5).as_f64(), Some(1.5));
        assert_eq!(RegisterValue::Number(1.5).as_text(), None);
        assert_eq!(RegisterValue::from("abc").as_text(), Some("abc"));
        assert_eq!(RegisterValue::from("abc").as_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(RegisterValue::Number(1234.0).to_string(), "1234");
        assert_eq!(RegisterValue::Number(-0.125).to_string(), "-0.125");
        assert_eq!(RegisterValue::Number(97.5).to_string(), "97.5");
        assert_eq!(RegisterValue::from("METER 1").to_string(), "METER 1");
    }

    #[test]
    fn test_type_name() {
        assert_eq!(RegisterValue::Number(0.0).type_name(), "number");
        assert_eq!(RegisterValue::from(String::new()).type_name(), "text");
    }
}
