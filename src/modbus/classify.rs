//! Response validation and payload decoding.
//!
//! A reply is first checked against the outstanding request (length, CRC,
//! address, function).  Any failure there is a [`ModbusError`] and makes the
//! cycle controller retry.  A reply that passes is decoded into a
//! [`Reading`]; a decoded diagnostic is final and never retried.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::crc::verify_crc;
use super::frame::FunctionCode;
use crate::config::{DeviceConfig, Endianness, RegisterOrder};

/// Smallest frame that can carry anything: addr, fc, one byte, CRC.
pub const MIN_RESPONSE_LEN: usize = 5;

/// Failure classes reported on the CAN side.  The discriminants are the
/// diagnostic codes the controller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusError {
    NoResponse = 1,
    InvalidReceiveLength = 2,
    CrcError = 3,
    InvalidResponse = 4,
    UnexpectedFunctionCode = 5,
    /// Echo of a write request; informational.
    ActorResponse = 6,
}

impl ModbusError {
    pub const ALL: [Self; 6] = [
        Self::NoResponse,
        Self::InvalidReceiveLength,
        Self::CrcError,
        Self::InvalidResponse,
        Self::UnexpectedFunctionCode,
        Self::ActorResponse,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ModbusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response"),
            Self::InvalidReceiveLength => write!(f, "invalid receive length"),
            Self::CrcError => write!(f, "CRC error"),
            Self::InvalidResponse => write!(f, "invalid response"),
            Self::UnexpectedFunctionCode => write!(f, "unexpected function code"),
            Self::ActorResponse => write!(f, "actor response"),
        }
    }
}

/// Per-device value encoding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoding {
    pub combine: bool,
    pub register_order: RegisterOrder,
    pub endianness: Endianness,
}

/// What the classifier needs to know about the request that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Index into the device table; 0 for relayed writes.
    pub device_index: u8,
    pub address: u8,
    pub function: u8,
    pub decoding: Decoding,
}

impl RequestContext {
    pub fn for_device(device_index: u8, device: &DeviceConfig) -> Self {
        Self {
            device_index,
            address: device.address,
            function: device.function.code(),
            decoding: Decoding {
                combine: device.cycle.combine,
                register_order: device.cycle.register_order,
                endianness: device.cycle.endianness,
            },
        }
    }

    /// Context for a relayed frame, taken from its own header bytes.
    pub fn for_relay(frame: &[u8]) -> Self {
        Self {
            device_index: 0,
            address: frame.first().copied().unwrap_or_default(),
            function: frame.get(1).copied().unwrap_or_default(),
            decoding: Decoding::default(),
        }
    }
}

/// Outcome of a reply that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Value(u32),
    Diagnostic {
        function_code: u8,
        error: ModbusError,
        raw: u32,
    },
}

/// Validate `rx` against `req` and decode it.
pub fn classify(rx: &[u8], req: &RequestContext) -> Result<Reading, ModbusError> {
    validate(rx, req)?;

    let data_len = rx.len() - MIN_RESPONSE_LEN;
    let diagnostic = |error, raw| Reading::Diagnostic {
        function_code: req.function,
        error,
        raw,
    };

    let reading = match FunctionCode::try_from(req.function) {
        Ok(FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs) => {
            if data_len == 1 {
                Reading::Value(u32::from(rx[3]))
            } else {
                diagnostic(ModbusError::InvalidReceiveLength, payload_window(rx))
            }
        }
        Ok(FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters) => {
            match (req.decoding.combine, data_len) {
                (true, 4) => Reading::Value(combined_value(rx, &req.decoding)),
                (false, 2) => {
                    let word = u16::from_le_bytes([rx[3], rx[4]]);
                    Reading::Value(u32::from(match req.decoding.endianness {
                        Endianness::Big => word,
                        Endianness::Little => word.swap_bytes(),
                    }))
                }
                _ => diagnostic(ModbusError::InvalidReceiveLength, payload_window(rx)),
            }
        }
        Ok(FunctionCode::ReadExceptionStatus) => Reading::Value(u32::from(rx[2])),
        Ok(
            FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleCoils
            | FunctionCode::WriteMultipleRegisters,
        ) => diagnostic(ModbusError::ActorResponse, le_window(&rx[2..rx.len() - 2])),
        Err(_) => diagnostic(ModbusError::UnexpectedFunctionCode, payload_window(rx)),
    };
    Ok(reading)
}

fn validate(rx: &[u8], req: &RequestContext) -> Result<(), ModbusError> {
    if rx.is_empty() {
        return Err(ModbusError::NoResponse);
    }
    if rx.len() < MIN_RESPONSE_LEN {
        return Err(ModbusError::InvalidReceiveLength);
    }
    if !verify_crc(rx) {
        return Err(ModbusError::CrcError);
    }
    if rx[0] != req.address || rx[1] != req.function {
        return Err(ModbusError::InvalidResponse);
    }
    Ok(())
}

/// Two registers as one value.  The four data bytes are taken low byte
/// first; `HighLow` swaps the halves, `Little` swaps the bytes of each half.
fn combined_value(rx: &[u8], decoding: &Decoding) -> u32 {
    let mut value = u32::from_le_bytes([rx[3], rx[4], rx[5], rx[6]]);
    if decoding.register_order == RegisterOrder::HighLow {
        value = value.rotate_left(16);
    }
    if decoding.endianness == Endianness::Little {
        value = ((value >> 8) & 0x00FF_00FF) | ((value << 8) & 0xFF00_FF00);
    }
    value
}

/// Payload bytes after the byte count, CRC excluded.
fn payload_window(rx: &[u8]) -> u32 {
    le_window(&rx[3..rx.len() - 2])
}

/// Little-endian u32 of the first four bytes of `bytes`, zero padded.
fn le_window(bytes: &[u8]) -> u32 {
    let mut window = [0u8; 4];
    let n = bytes.len().min(4);
    window[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(window)
}
