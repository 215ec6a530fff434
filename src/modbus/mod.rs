//! Modbus RTU protocol core: framing, CRC and response classification.
//!
//! Everything here is pure and allocation-free; the I/O side lives in
//! [`crate::controller`].

pub mod classify;
pub mod crc;
pub mod frame;

pub use classify::{Decoding, ModbusError, Reading, RequestContext, classify};
pub use self::crc::{crc16, verify_crc};
pub use frame::{
    Frame, FunctionCode, MAX_FRAME_SIZE, build_pdu_frame, build_request_frame, build_write_frame,
};
