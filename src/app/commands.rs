//! Inbound commands from the CAN side.
//!
//! These arrive on the message-bus task and are interpreted by the
//! [`BusHandler`](super::service::BusHandler).  Payloads are borrowed from
//! the receive buffer of the CAN adapter; nothing here owns memory.

/// Commands the CAN side can send to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCommand<'a> {
    /// A complete configuration block, reassembled from fragments.
    LoadConfig(&'a [u8]),

    /// A write sub-command: opcode plus its data bytes
    /// (`[address][register lo][register hi][payload…]`).
    Write { opcode: u8, data: &'a [u8] },

    /// The controller (re)started and asks who is online.
    StartRequest,
}
