//! # Register/Byte Conversions
//!
//! Registers are always interpreted big-endian, at both the word and the
//! byte level (network byte order, `ABCD` in PLC notation):
//!
//! - `[0x1234, 0x5678]` → `[0x12, 0x34, 0x56, 0x78]`
//!
//! Multi-register integers are taken from the leading bytes of the block.

/// Flatten registers into bytes, most significant byte first.
///
/// # Example
///
/// ```rust
/// use modbus_poller::bytes::regs_to_bytes;
///
/// assert_eq!(regs_to_bytes(&[0x1234, 0x5678]), vec![0x12, 0x34, 0x56, 0x78]);
/// ```
#[inline]
pub fn regs_to_bytes(regs: &[u16]) -> Vec<u8> {
    regs.iter().flat_map(|reg| reg.to_be_bytes()).collect()
}

/// Pack bytes into registers, padding an odd trailing byte with zero.
///
/// # Example
///
/// ```rust
/// use modbus_poller::bytes::bytes_to_regs;
///
/// assert_eq!(bytes_to_regs(b"ABC"), vec![0x4142, 0x4300]);
/// ```
#[inline]
pub fn bytes_to_regs(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

/// The first `N` bytes of `bytes`, if there are that many.
#[inline]
pub fn leading<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

/// Split a 32-bit value into two registers.
#[inline]
pub fn u32_to_regs(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Split a 64-bit value into four registers.
#[inline]
pub fn u64_to_regs(value: u64) -> [u16; 4] {
    [
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ]
}

// ============================================================================
// Tests
// ============================================================================
