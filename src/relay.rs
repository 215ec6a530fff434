//! Command relay: write requests from the CAN side into bus frames.
//!
//! ```text
//! ┌──────────────┐  WriteCommand  ┌──────────────┐  Frame  ┌──────────────┐
//! │ Bus handler  │───────────────▶│  RelayQueue  │────────▶│ Bus worker   │
//! │ (CAN task)   │   try_send     │  (bounded)   │ try_recv│ (controller) │
//! └──────────────┘                └──────────────┘         └──────────────┘
//! ```
//!
//! Sub-command data is 7 bytes: `[address][register lo][register hi][payload…]`.
//! The register arrives little-endian from the CAN side and goes out on the
//! wire big-endian; payload bytes are copied verbatim.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use crate::error::RelayError;
use crate::modbus::frame::{Frame, FunctionCode, build_write_frame};

/// Frames that may wait for the bus at once.
pub const RELAY_DEPTH: usize = 8;

/// Size of the data part of a write sub-command.
pub const WRITE_DATA_LEN: usize = 7;

const HEADER_LEN: usize = 3;

/// Write sub-commands accepted from the CAN side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteOpcode {
    SingleCoil = 0x50,
    SingleRegister = 0x51,
    MultipleRegisters2 = 0x52,
    MultipleRegisters4 = 0x53,
    MultipleCoils1 = 0x54,
    SingleRegister4 = 0x55,
}

impl WriteOpcode {
    pub const fn function(self) -> FunctionCode {
        match self {
            Self::SingleCoil => FunctionCode::WriteSingleCoil,
            Self::SingleRegister | Self::SingleRegister4 => FunctionCode::WriteSingleRegister,
            Self::MultipleRegisters2 | Self::MultipleRegisters4 => {
                FunctionCode::WriteMultipleRegisters
            }
            Self::MultipleCoils1 => FunctionCode::WriteMultipleCoils,
        }
    }

    pub const fn payload_len(self) -> usize {
        match self {
            Self::SingleCoil | Self::SingleRegister | Self::MultipleRegisters2 => 2,
            Self::MultipleRegisters4 | Self::SingleRegister4 => 4,
            Self::MultipleCoils1 => 1,
        }
    }

    pub const fn is_multiple(self) -> bool {
        matches!(
            self,
            Self::MultipleRegisters2 | Self::MultipleRegisters4 | Self::MultipleCoils1
        )
    }
}

impl TryFrom<u8> for WriteOpcode {
    type Error = RelayError;

    fn try_from(raw: u8) -> Result<Self, RelayError> {
        match raw {
            0x50 => Ok(Self::SingleCoil),
            0x51 => Ok(Self::SingleRegister),
            0x52 => Ok(Self::MultipleRegisters2),
            0x53 => Ok(Self::MultipleRegisters4),
            0x54 => Ok(Self::MultipleCoils1),
            0x55 => Ok(Self::SingleRegister4),
            other => Err(RelayError::UnknownOpcode(other)),
        }
    }
}

/// A parsed write sub-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCommand {
    pub address: u8,
    pub opcode: WriteOpcode,
    pub register: u16,
    payload: [u8; 4],
}

impl WriteCommand {
    pub fn parse(opcode: u8, data: &[u8]) -> Result<Self, RelayError> {
        let opcode = WriteOpcode::try_from(opcode)?;
        let needed = HEADER_LEN + opcode.payload_len();
        if data.len() < needed {
            return Err(RelayError::PayloadTooShort {
                needed,
                actual: data.len(),
            });
        }
        let mut payload = [0u8; 4];
        payload[..opcode.payload_len()].copy_from_slice(&data[HEADER_LEN..needed]);
        Ok(Self {
            address: data[0],
            opcode,
            register: u16::from_le_bytes([data[1], data[2]]),
            payload,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.opcode.payload_len()]
    }

    pub fn to_frame(&self) -> Frame {
        build_write_frame(
            self.address,
            self.opcode.function(),
            self.register,
            self.payload(),
            self.opcode.is_multiple(),
        )
    }
}

/// Bounded FIFO of complete frames between the CAN task and the bus worker.
///
/// Neither side ever blocks.  A frame offered to a full queue is dropped and
/// counted.
pub struct RelayQueue {
    channel: Channel<CriticalSectionRawMutex, Frame, RELAY_DEPTH>,
    dropped: AtomicU32,
}

impl RelayQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Parse a write sub-command and queue its frame.
    pub fn submit(&self, opcode: u8, data: &[u8]) -> Result<(), RelayError> {
        let cmd = WriteCommand::parse(opcode, data)?;
        debug!(
            "Relay: {:?} slave={} reg=0x{:04X} payload={:02X?}",
            cmd.opcode,
            cmd.address,
            cmd.register,
            cmd.payload()
        );
        self.enqueue(cmd.to_frame())
    }

    pub fn enqueue(&self, frame: Frame) -> Result<(), RelayError> {
        self.channel.try_send(frame).map_err(|_| {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Relay: queue full, frame dropped ({n} total)");
            RelayError::QueueFull
        })
    }

    /// Next frame for the bus, if any.
    pub fn try_next(&self) -> Option<Frame> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Frames lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new()
    }
}
