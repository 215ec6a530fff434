//! Channel adapters between the bus worker and the CAN task.
//!
//! Uses `embassy-sync` bounded channels so both tasks share static queues
//! without heap allocation.
//!
//! ```text
//! ┌──────────────┐  InboundMessage   ┌──────────────┐
//! │   CAN task   │──────────────────▶│  BusHandler  │
//! │              │◀──────────────────│  bus worker  │
//! └──────────────┘   GatewayEvent    └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::commands::BusCommand;
use crate::app::events::GatewayEvent;
use crate::app::ports::EventSink;
use crate::config::CONFIG_BLOB_SIZE;
use crate::relay::WRITE_DATA_LEN;

/// Channel depth for events towards the CAN side.
pub const OUTBOUND_DEPTH: usize = 32;

/// Channel depth for commands from the CAN side.
pub const INBOUND_DEPTH: usize = 4;

pub type EventChannel<const N: usize> = Channel<CriticalSectionRawMutex, GatewayEvent, N>;

/// Events waiting to be framed onto CAN.
pub static OUTBOUND: EventChannel<OUTBOUND_DEPTH> = Channel::new();

/// Commands reassembled by the CAN task.
pub static INBOUND: Channel<CriticalSectionRawMutex, InboundMessage, INBOUND_DEPTH> =
    Channel::new();

/// Owned form of a [`BusCommand`] that can cross a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    LoadConfig(heapless::Vec<u8, CONFIG_BLOB_SIZE>),
    Write {
        opcode: u8,
        data: [u8; WRITE_DATA_LEN],
    },
    StartRequest,
}

impl InboundMessage {
    pub fn as_command(&self) -> BusCommand<'_> {
        match self {
            Self::LoadConfig(blob) => BusCommand::LoadConfig(blob.as_slice()),
            Self::Write { opcode, data } => BusCommand::Write {
                opcode: *opcode,
                data: data.as_slice(),
            },
            Self::StartRequest => BusCommand::StartRequest,
        }
    }
}

/// [`EventSink`] that pushes events into an outbound channel without
/// blocking.  Events that do not fit are dropped and counted.
pub struct ChannelSink<'a, const N: usize> {
    channel: &'a EventChannel<N>,
    dropped: u32,
}

impl<'a, const N: usize> ChannelSink<'a, N> {
    pub fn new(channel: &'a EventChannel<N>) -> Self {
        Self { channel, dropped: 0 }
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<const N: usize> EventSink for ChannelSink<'_, N> {
    fn emit(&mut self, event: &GatewayEvent) {
        if self.channel.try_send(*event).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            if self.dropped.is_power_of_two() {
                warn!("Outbound: channel full, {} events dropped", self.dropped);
            }
        }
    }
}
