//! Optimized Modbus PDU data structure
//!
//! Use a fixed-size stack array to avoid heap allocation on every request.

use tracing::debug;

use crate::constants::{EXCEPTION_FLAG, MAX_PDU_SIZE, MAX_READ_REGISTERS};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};

/// High-performance PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_PDU_SIZE],
    /// Actual data length
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        match pdu.function_code() {
            Some(fc) if pdu.is_exception() => debug!(
                "PDU parsed: FC={:02X} (Exception: {}), exception_code={:02X}",
                fc,
                Self::function_code_description(fc),
                pdu.exception_code().unwrap_or(0)
            ),
            Some(fc) => debug!(
                "PDU parsed: FC={:02X} ({}), data_len={}",
                fc,
                Self::function_code_description(fc),
                pdu.len - 1
            ),
            None => debug!("PDU parsed: empty PDU"),
        }

        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::invalid_data("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        for byte in value.to_be_bytes() {
            self.push(byte)?;
        }
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        if self.len > 0 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    /// Get exception code
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Get human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            _ => "Unknown Function",
        }
    }

    /// Interpret this PDU as the answer to `request`.
    ///
    /// Exception responses become [`ModbusError::Exception`]; a function
    /// code that does not match the request is a protocol error.
    pub fn into_response(self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let expected = request.function.to_u8();
        let fc = self
            .function_code()
            .ok_or_else(|| ModbusError::protocol("Empty response PDU"))?;

        if self.is_exception() && fc & !EXCEPTION_FLAG == expected {
            let code = self.exception_code().unwrap_or(0);
            return Err(ModbusError::exception(expected, code));
        }

        if fc != expected {
            return Err(ModbusError::protocol(format!(
                "Function code mismatch: expected {:#04x}, got {:#04x}",
                expected, fc
            )));
        }

        Ok(ModbusResponse::new_success(
            request.slave_id,
            request.function,
            self.as_slice()[1..].to_vec(),
        ))
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    /// Create a new builder
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Set function code
    #[inline]
    pub fn function_code(mut self, fc: u8) -> ModbusResult<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Add address
    #[inline]
    pub fn address(mut self, addr: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    /// Add quantity
    #[inline]
    pub fn quantity(mut self, qty: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    /// Build the PDU
    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            debug!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    /// Build a register read request PDU (FC03/FC04)
    ///
    /// # Arguments
    /// * `function` - Holding or input register read
    /// * `start_address` - First register
    /// * `quantity` - Number of registers (1-125)
    pub fn build_read_request(
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<ModbusPdu> {
        if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_data(format!(
                "Invalid register quantity {} (must be 1-{})",
                quantity, MAX_READ_REGISTERS
            )));
        }
        Ok(PduBuilder::new()
            .function_code(function.to_u8())?
            .address(start_address)?
            .quantity(quantity)?
            .build())
    }

    /// Build a successful register read response PDU.
    ///
    /// Used by test responders and mock transports.
    pub fn build_read_response(function: ModbusFunction, values: &[u16]) -> ModbusResult<ModbusPdu> {
        if values.len() > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_data("Too many registers for one response"));
        }
        let mut pdu = ModbusPdu::new();
        pdu.push(function.to_u8())?;
        pdu.push((values.len() * 2) as u8)?;
        for &value in values {
            pdu.push_u16(value)?;
        }
        Ok(pdu)
    }

    /// Build an exception response PDU
    pub fn build_exception(function: ModbusFunction, code: u8) -> ModbusResult<ModbusPdu> {
        let mut pdu = ModbusPdu::new();
        pdu.push(function.to_u8() | EXCEPTION_FLAG)?;
        pdu.push(code)?;
        Ok(pdu)
    }
}

/// Shorthand used by transports: the request as a PDU.
pub fn request_pdu(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    PduBuilder::build_read_request(request.function, request.address, request.quantity)
}

/// Shorthand used by responders: which request does this PDU carry?
pub fn parse_request(slave_id: SlaveId, pdu: &ModbusPdu) -> ModbusResult<ModbusRequest> {
    let data = pdu.as_slice();
    if data.len() != 5 {
        return Err(ModbusError::frame(format!(
            "Read request PDU must be 5 bytes, got {}",
            data.len()
        )));
    }
    let function = ModbusFunction::from_u8(data[0])?;
    let address = u16::from_be_bytes([data[1], data[2]]);
    let quantity = u16::from_be_bytes([data[3], data[4]]);
    Ok(ModbusRequest::new(slave_id, function, address, quantity))
}
