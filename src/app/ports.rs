//! Port traits: the hexagonal boundary between the protocol engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ GatewayService (domain)
//! ```
//!
//! The RS-485 UART, the system timer and the CAN-side publisher implement
//! these traits.  [`GatewayService`](super::service::GatewayService) consumes
//! them via generics, so the engine never touches hardware directly and the
//! whole poll/relay cycle runs on the host in tests.

use crate::config::SerialConfig;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Serial port (driven adapter: domain → RS-485 line)
// ───────────────────────────────────────────────────────────────

/// Line direction of the half-duplex transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// Half-duplex serial transport.
///
/// Received bytes do not come back through this trait: the adapter's
/// interrupt side pushes them into an [`RxWriter`](crate::rx::RxWriter).
pub trait SerialPort {
    /// Apply baud rate and frame format.
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError>;

    /// Switch the transceiver driver.
    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError>;

    /// Send one byte, blocking until it is handed to the UART.
    fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain → system timer)
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds and a blocking sleep.
pub trait Clock {
    fn now_ms(&self) -> u64;

    fn sleep_ms(&self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → CAN side / logging)
// ───────────────────────────────────────────────────────────────

/// The engine emits [`GatewayEvent`](super::events::GatewayEvent)s through
/// this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::GatewayEvent);
}

/// Fan out to two sinks, e.g. the CAN publisher and the serial log.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::GatewayEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &super::events::GatewayEvent) {
        (**self).emit(event);
    }
}
