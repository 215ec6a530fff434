//! Modbus RTU frame construction.
//!
//! Wire format:
//! ```text
//! ┌──────────┬───────────┬─────────────────┬───────┬───────┐
//! │ Address  │ Function  │ Data (N bytes)  │ CRC lo│ CRC hi│
//! │ 1 byte   │ 1 byte    │                 │       │       │
//! └──────────┴───────────┴─────────────────┴───────┴───────┘
//! ```
//!
//! Frames live in a fixed-capacity [`Frame`] buffer.  No frame the gateway
//! originates comes anywhere near [`MAX_FRAME_SIZE`]; asking a builder for a
//! larger one is a bug in the caller and panics.

use serde::{Deserialize, Serialize};

use super::crc::crc16;

/// Upper bound for any frame on the link, request or response.
pub const MAX_FRAME_SIZE: usize = 32;

/// A complete RTU frame, CRC included.
pub type Frame = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// Function codes the gateway originates or expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 1,
    ReadDiscreteInputs = 2,
    ReadHoldingRegisters = 3,
    ReadInputRegisters = 4,
    WriteSingleCoil = 5,
    WriteSingleRegister = 6,
    ReadExceptionStatus = 7,
    WriteMultipleCoils = 15,
    WriteMultipleRegisters = 16,
}

impl FunctionCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Codes the poll scheduler may issue on its own.
    pub const fn is_pollable(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
                | Self::ReadExceptionStatus
        )
    }

    /// Write codes whose reply is an echo of the request.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteSingleCoil
                | Self::WriteSingleRegister
                | Self::WriteMultipleCoils
                | Self::WriteMultipleRegisters
        )
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            1 => Ok(Self::ReadCoils),
            2 => Ok(Self::ReadDiscreteInputs),
            3 => Ok(Self::ReadHoldingRegisters),
            4 => Ok(Self::ReadInputRegisters),
            5 => Ok(Self::WriteSingleCoil),
            6 => Ok(Self::WriteSingleRegister),
            7 => Ok(Self::ReadExceptionStatus),
            15 => Ok(Self::WriteMultipleCoils),
            16 => Ok(Self::WriteMultipleRegisters),
            other => Err(other),
        }
    }
}

/// Build a read request: `[addr][fc][regHi][regLo][cntHi][cntLo][crcLo][crcHi]`.
pub fn build_request_frame(
    address: u8,
    function: FunctionCode,
    register: u16,
    word_count: u16,
) -> Frame {
    let mut frame = Frame::new();
    push(&mut frame, &[address, function.code()]);
    push(&mut frame, &register.to_be_bytes());
    push(&mut frame, &word_count.to_be_bytes());
    append_crc(&mut frame);
    frame
}

/// Build a write request.
///
/// Multiple writes carry `[quantity hi][quantity lo][byte count]` between the
/// register address and the payload.  The quantity is the number of 16-bit
/// registers (rounded up) for register writes and eight coils per payload
/// byte for coil writes.  Single writes put the payload right after the
/// register address.
pub fn build_write_frame(
    address: u8,
    function: FunctionCode,
    register: u16,
    payload: &[u8],
    is_multiple: bool,
) -> Frame {
    let mut frame = Frame::new();
    push(&mut frame, &[address, function.code()]);
    push(&mut frame, &register.to_be_bytes());
    if is_multiple {
        let quantity = if function == FunctionCode::WriteMultipleCoils {
            payload.len() * 8
        } else {
            payload.len().div_ceil(2)
        };
        push(&mut frame, &(quantity as u16).to_be_bytes());
        push(&mut frame, &[payload.len() as u8]);
    }
    push(&mut frame, payload);
    append_crc(&mut frame);
    frame
}

/// Build a frame whose body has no register field, e.g. Read Exception
/// Status: `[addr][07][crcLo][crcHi]`.
pub fn build_pdu_frame(address: u8, function: FunctionCode, data: &[u8]) -> Frame {
    let mut frame = Frame::new();
    push(&mut frame, &[address, function.code()]);
    push(&mut frame, data);
    append_crc(&mut frame);
    frame
}

fn append_crc(frame: &mut Frame) {
    let crc = crc16(frame.as_slice());
    push(frame, &crc.to_le_bytes());
}

fn push(frame: &mut Frame, bytes: &[u8]) {
    if frame.extend_from_slice(bytes).is_err() {
        panic!("Modbus frame exceeds {} bytes", MAX_FRAME_SIZE);
    }
}
