//! Modbus CRC16 (reflected polynomial 0xA001, seed 0xFFFF).
//!
//! The checksum is transmitted low byte first, so a frame ends in
//! `[crc & 0xFF][crc >> 8]`.

use crc::{CRC_16_MODBUS, Crc};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC16 over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    MODBUS.checksum(bytes)
}

/// Check the trailing two bytes of `frame` against the CRC of everything
/// before them.  Frames shorter than three bytes never verify.
pub fn verify_crc(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let crc = crc16(body);
    tail[0] == (crc & 0xFF) as u8 && tail[1] == (crc >> 8) as u8
}
