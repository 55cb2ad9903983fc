//! Modbus request/response model for register reads

use std::fmt;

use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE, EXCEPTION_GATEWAY_TARGET_FAILED,
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};

/// Modbus unit identifier (slave address)
pub type SlaveId = u8;

/// Register read functions issued by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// FC03
    ReadHoldingRegisters,
    /// FC04
    ReadInputRegisters,
}

impl ModbusFunction {
    /// Parse a function code
    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            _ => Err(ModbusError::InvalidFunction { code }),
        }
    }

    /// Wire value of the function code
    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadHoldingRegisters => write!(f, "Read Holding Registers (0x03)"),
            Self::ReadInputRegisters => write!(f, "Read Input Registers (0x04)"),
        }
    }
}

/// Exception codes a device may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusException {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    Unknown(u8),
}

impl ModbusException {
    /// Map a raw exception code
    pub fn from_code(code: u8) -> Self {
        match code {
            EXCEPTION_ILLEGAL_FUNCTION => Self::IllegalFunction,
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Self::IllegalDataAddress,
            EXCEPTION_ILLEGAL_DATA_VALUE => Self::IllegalDataValue,
            EXCEPTION_SERVER_DEVICE_FAILURE => Self::ServerDeviceFailure,
            EXCEPTION_ACKNOWLEDGE => Self::Acknowledge,
            EXCEPTION_SERVER_DEVICE_BUSY => Self::ServerDeviceBusy,
            EXCEPTION_MEMORY_PARITY_ERROR => Self::MemoryParityError,
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Self::GatewayPathUnavailable,
            EXCEPTION_GATEWAY_TARGET_FAILED => Self::GatewayTargetFailed,
            other => Self::Unknown(other),
        }
    }

    /// Raw exception code
    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
            Self::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
            Self::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
            Self::ServerDeviceFailure => EXCEPTION_SERVER_DEVICE_FAILURE,
            Self::Acknowledge => EXCEPTION_ACKNOWLEDGE,
            Self::ServerDeviceBusy => EXCEPTION_SERVER_DEVICE_BUSY,
            Self::MemoryParityError => EXCEPTION_MEMORY_PARITY_ERROR,
            Self::GatewayPathUnavailable => EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
            Self::GatewayTargetFailed => EXCEPTION_GATEWAY_TARGET_FAILED,
            Self::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::ServerDeviceFailure => "Server Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
            Self::Unknown(_) => "Unknown Exception",
        };
        write!(f, "exception {:#04x} ({})", self.code(), text)
    }
}

/// A register read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub slave_id: SlaveId,
    pub function: ModbusFunction,
    pub address: u16,
    pub quantity: u16,
}

impl ModbusRequest {
    pub fn new(slave_id: SlaveId, function: ModbusFunction, address: u16, quantity: u16) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
        }
    }
}

/// A successful response to a register read.
///
/// `data` holds the PDU payload after the function code: the byte count
/// followed by the register bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub slave_id: SlaveId,
    pub function: ModbusFunction,
    data: Vec<u8>,
}

impl ModbusResponse {
    /// Build a success response from the PDU payload
    pub fn new_success(slave_id: SlaveId, function: ModbusFunction, data: Vec<u8>) -> Self {
        Self {
            slave_id,
            function,
            data,
        }
    }

    /// Raw payload (byte count + register bytes)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the register block, skipping the byte count prefix.
    ///
    /// A byte count that disagrees with the payload length is a protocol
    /// error; an odd trailing byte is ignored.
    pub fn parse_registers(&self) -> ModbusResult<Vec<u16>> {
        let (&byte_count, payload) = self
            .data
            .split_first()
            .ok_or_else(|| ModbusError::protocol("Empty register response"))?;

        if payload.len() < byte_count as usize {
            return Err(ModbusError::protocol(format!(
                "Byte count {} exceeds payload of {} bytes",
                byte_count,
                payload.len()
            )));
        }

        Ok(payload[..byte_count as usize]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}
