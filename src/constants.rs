//! Modbus protocol constants and poller defaults
//!
//! Protocol constants are derived from the official Modbus specification:
//! - Maximum PDU size: 253 bytes (inherited from RS485 ADU limit of 256 bytes)
//! - Register limits are calculated to fit within the PDU size constraint
//!
//! Poller defaults describe the engine behaviour when nothing is configured.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Modbus MBAP header length for TCP
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) = 6 bytes
/// Note: Unit ID is counted by the Length field, not by the header
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
/// = 1 (Unit ID) + 253 (Max PDU) = 254 bytes
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// MBAP protocol identifier, always zero for Modbus
pub const MBAP_PROTOCOL_ID: u16 = 0;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Register Data: N × 2 bytes
/// - Total: 1 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 2) / 2 = 125.5 → 125 registers
pub const MAX_READ_REGISTERS: usize = 125;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Poller Defaults
// ============================================================================

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default unit (slave) identifier
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Default connect and per-request timeout (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default delay between two registers of the same pass
pub const DEFAULT_REGISTER_DELAY_MS: u64 = 100;

/// Default delay between two passes when looping
pub const DEFAULT_LOOP_DELAY_MS: u64 = 1000;

/// Seed value of the running latency average
pub const DEFAULT_INITIAL_AVERAGE_MS: f64 = 100.0;

/// Weight of the newest sample in the running latency average
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.05;

/// Consecutive connection-level read failures tolerated before giving up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

// ============================================================================
// Symbolic Result Messages
// ============================================================================

/// Device declined the read (exception response or mismatched reply)
pub const MSG_REGISTER_NOT_FOUND: &str = "REGISTER NOT FOUND";

/// Device reachable but did not answer in time
pub const MSG_IO_TIMEOUT: &str = "I/O ERROR (TIMEOUT)";

/// Encoding tag not understood
pub const MSG_FORMAT_NOT_SUPPORTED: &str = "FORMAT NOT SUPPORTED";

/// Register block too short for the requested encoding
pub const MSG_DECODE_FAILED: &str = "DECODE FAILED";

/// Function column is neither 3 nor 4
pub const MSG_FUNCTION_NOT_SUPPORTED: &str = "FUNCTION NOT SUPPORTED";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(MBAP_HEADER_LEN, 6);
        assert_eq!(MAX_PDU_SIZE, 253);
        assert_eq!(MAX_MBAP_LENGTH, 254);
    }

    #[test]
    fn test_register_limits() {
        let read_pdu_size = 1 + 1 + (MAX_READ_REGISTERS * 2);
        assert!(read_pdu_size <= MAX_PDU_SIZE);
        assert_eq!(MAX_READ_REGISTERS, 125);
    }

    #[test]
    fn test_poller_defaults() {
        assert!(DEFAULT_SMOOTHING_FACTOR > 0.0 && DEFAULT_SMOOTHING_FACTOR <= 1.0);
        assert_eq!(MAX_CONSECUTIVE_FAILURES, 5);
        assert_eq!(FC_READ_HOLDING_REGISTERS | EXCEPTION_FLAG, 0x83);
    }
}
