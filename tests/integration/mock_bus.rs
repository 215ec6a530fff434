//! Mock RS-485 bus, clock and event sink for integration tests.
//!
//! The serial mock records every transmitted frame and, when the line is
//! turned around to receive, asks a responder closure what the "slave"
//! answers.  The answer is pushed through the real [`RxWriter`], so the
//! gateway reads it exactly as it would read interrupt-fed bytes.

use std::cell::{Cell, RefCell};

use modbus_bridge::app::events::GatewayEvent;
use modbus_bridge::app::ports::{Clock, Direction, EventSink, SerialPort};
use modbus_bridge::config::SerialConfig;
use modbus_bridge::error::TransportError;
use modbus_bridge::modbus::{ModbusError, crc16};
use modbus_bridge::rx::RxWriter;

/// Decides the reply to a transmitted frame; `None` is silence.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>>>;

// ── MockSerial ────────────────────────────────────────────────

pub struct MockSerial<'a> {
    writer: RxWriter<'a>,
    responder: Responder,
    current: Vec<u8>,
    pub frames: Vec<Vec<u8>>,
    pub configured: Vec<SerialConfig>,
}

#[allow(dead_code)]
impl<'a> MockSerial<'a> {
    pub fn new(writer: RxWriter<'a>, responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + 'static) -> Self {
        Self {
            writer,
            responder: Box::new(responder),
            current: Vec::new(),
            frames: Vec::new(),
            configured: Vec::new(),
        }
    }

    /// A bus where nobody ever answers.
    pub fn silent(writer: RxWriter<'a>) -> Self {
        Self::new(writer, |_| None)
    }

    /// A bus where every slave answers correctly.
    pub fn echoing(writer: RxWriter<'a>) -> Self {
        Self::new(writer, |frame| Some(good_reply(frame)))
    }

    pub fn set_responder(&mut self, responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + 'static) {
        self.responder = Box::new(responder);
    }
}

impl SerialPort for MockSerial<'_> {
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        self.configured.push(*config);
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        match direction {
            Direction::Transmit => self.current.clear(),
            Direction::Receive => {
                let frame = std::mem::take(&mut self.current);
                if let Some(reply) = (self.responder)(&frame) {
                    for byte in reply {
                        self.writer.on_byte_received(byte);
                    }
                }
                self.frames.push(frame);
            }
        }
        Ok(())
    }

    fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.current.push(byte);
        Ok(())
    }
}

// ── MockClock ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockClock {
    now: Cell<u64>,
    pub sleeps: RefCell<Vec<u32>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
        self.advance(u64::from(ms));
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<GatewayEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<(u8, u32)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                GatewayEvent::SensorValue {
                    device_index,
                    value,
                    ..
                } => Some((device_index, value)),
                _ => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<(u8, ModbusError, u32)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                GatewayEvent::Diagnostic {
                    function_code,
                    error,
                    raw,
                } => Some((function_code, error, raw)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &GatewayEvent) {
        self.events.push(*event);
    }
}

// ── Frame helpers ─────────────────────────────────────────────

pub fn with_crc(body: &[u8]) -> Vec<u8> {
    let mut v = body.to_vec();
    v.extend_from_slice(&crc16(body).to_le_bytes());
    v
}

/// A well-formed slave reply to `request`.  Register reads return
/// `01 02 03 04…`, coil reads return `0x01`, writes are echoed.
pub fn good_reply(request: &[u8]) -> Vec<u8> {
    let (address, function) = (request[0], request[1]);
    match function {
        1 | 2 => with_crc(&[address, function, 1, 0x01]),
        3 | 4 => {
            let words = request[5];
            let mut body = vec![address, function, words * 2];
            body.extend(1..=words * 2);
            with_crc(&body)
        }
        7 => with_crc(&[address, function, 0x42]),
        _ => with_crc(&request[..6]),
    }
}
