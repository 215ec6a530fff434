//! Unified error types for the gateway firmware.
//!
//! Every fallible operation outside the protocol core converts into
//! [`Error`].  Protocol-level failures on the wire are not errors in this
//! sense: they are [`ModbusError`](crate::modbus::ModbusError) values that
//! get published as diagnostics.  All variants are `Copy`.

use core::fmt;

pub use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A configuration block was rejected.
    Config(ConfigError),
    /// The serial link could not be driven.
    Transport(TransportError),
    /// A write command could not be queued.
    Relay(RelayError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Relay(e) => write!(f, "relay: {e}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Serial transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The UART refused a byte.
    WriteFailed,
    /// The RS-485 driver-enable line could not be switched.
    DirectionPin,
    /// Baud rate or frame format not accepted by the UART.
    ConfigureFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed => write!(f, "UART write failed"),
            Self::DirectionPin => write!(f, "direction pin failed"),
            Self::ConfigureFailed => write!(f, "UART configuration failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Command relay errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// The relay queue is at capacity; the frame was dropped.
    QueueFull,
    /// Opcode outside the write sub-command range.
    UnknownOpcode(u8),
    /// Fewer data bytes than the opcode needs.
    PayloadTooShort { needed: usize, actual: usize },
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "relay queue full"),
            Self::UnknownOpcode(op) => write!(f, "unknown write opcode 0x{op:02X}"),
            Self::PayloadTooShort { needed, actual } => {
                write!(f, "payload too short ({actual} of {needed} bytes)")
            }
        }
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
