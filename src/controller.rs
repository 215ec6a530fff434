//! Transmit/receive cycle controller: the only code that touches the bus.
//!
//! One exchange:
//!
//! ```text
//!  1. DE high, clear RX        ┐
//!  2. send frame byte by byte  │ transmit
//!  3. DE low                   ┘
//!  4. wait for first reply byte, 100 ms steps up to the response timeout
//!  5. classify the reply
//!  6. turnaround pause, clear RX
//! ```
//!
//! A reply that fails validation reruns the whole exchange once.  Decoded
//! diagnostics are final.  Polls and relayed writes both go through
//! [`CycleController::transact`], so they can never overlap on the wire.

use log::{debug, trace, warn};

use crate::app::events::GatewayEvent;
use crate::app::ports::{Clock, Direction, EventSink, SerialPort};
use crate::config::BusTiming;
use crate::modbus::{ModbusError, Reading, RequestContext, classify};
use crate::rx::{RxBuffer, RxReader};
use crate::stats::LinkStats;

/// Granularity of the reply wait.
pub const WAIT_STEP_MS: u32 = 100;

/// Extra exchanges after a validation failure.
pub const RETRIES: u8 = 1;

/// Run `attempt` until it succeeds or `retries` extra attempts have failed.
/// The attempt number (0 for the first) is passed in.
pub fn with_retries<T, E>(
    retries: u8,
    mut attempt: impl FnMut(u8) -> Result<T, E>,
) -> Result<T, E> {
    let mut n = 0;
    loop {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(e) if n >= retries => return Err(e),
            Err(_) => n += 1,
        }
    }
}

pub struct CycleController<'a> {
    rx: RxReader<'a>,
    timing: BusTiming,
    stats: LinkStats,
}

impl<'a> CycleController<'a> {
    pub fn new(rx: RxReader<'a>, timing: BusTiming) -> Self {
        Self {
            rx,
            timing,
            stats: LinkStats::default(),
        }
    }

    pub fn timing(&self) -> BusTiming {
        self.timing
    }

    pub fn set_timing(&mut self, timing: BusTiming) {
        self.timing = timing;
    }

    /// Current counters, receive-queue drops included.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            rx_dropped: self.rx.dropped(),
            ..self.stats
        }
    }

    /// One transmit/receive cycle for `frame`, no retry.
    pub fn exchange<P: SerialPort, C: Clock>(
        &mut self,
        frame: &[u8],
        req: &RequestContext,
        port: &mut P,
        clock: &C,
    ) -> Result<Reading, ModbusError> {
        self.stats.attempts = self.stats.attempts.wrapping_add(1);

        if let Err(e) = port.set_direction(Direction::Transmit) {
            warn!("Cycle: switching to transmit failed: {}", e);
        }
        self.rx.clear();

        trace!("Cycle: TX {:02X?}", frame);
        for (i, &byte) in frame.iter().enumerate() {
            if let Err(e) = port.transmit_byte(byte) {
                warn!("Cycle: byte {}/{} not sent: {}", i + 1, frame.len(), e);
            }
        }

        if let Err(e) = port.set_direction(Direction::Receive) {
            warn!("Cycle: switching to receive failed: {}", e);
        }

        let mut waited = 0;
        while waited < self.timing.response_timeout_ms {
            let step = WAIT_STEP_MS.min(self.timing.response_timeout_ms - waited);
            clock.sleep_ms(step);
            waited += step;
            if self.rx.pending() {
                break;
            }
        }

        let mut reply = RxBuffer::new();
        self.rx.drain_into(&mut reply);
        trace!("Cycle: RX {:02X?} after {} ms", reply.as_slice(), waited);

        let result = classify(&reply, req);

        clock.sleep_ms(self.timing.inter_frame_pause_ms);
        self.rx.clear();

        result
    }

    /// Exchange `frame` with one retry and publish the outcome.
    ///
    /// Returns `true` when a reply passed validation.
    pub fn transact<P: SerialPort, C: Clock, S: EventSink>(
        &mut self,
        frame: &[u8],
        req: &RequestContext,
        port: &mut P,
        clock: &C,
        sink: &mut S,
    ) -> bool {
        let result = with_retries(RETRIES, |attempt| {
            if attempt > 0 {
                self.stats.retries = self.stats.retries.wrapping_add(1);
                debug!(
                    "Cycle: retrying slave {} fc {} (attempt {})",
                    req.address,
                    req.function,
                    attempt + 1
                );
            }
            let outcome = self.exchange(frame, req, port, clock);
            if let Err(error) = outcome {
                self.stats.record_error(error);
            }
            outcome
        });

        match result {
            Ok(Reading::Value(value)) => {
                self.stats.values = self.stats.values.wrapping_add(1);
                debug!(
                    "Cycle: device #{} slave {} = {} (0x{:08X})",
                    req.device_index, req.address, value, value
                );
                sink.emit(&GatewayEvent::value(req.device_index, value));
                true
            }
            Ok(Reading::Diagnostic {
                function_code,
                error,
                raw,
            }) => {
                self.stats.record_error(error);
                self.publish_diagnostic(sink, function_code, error, raw);
                true
            }
            Err(error) => {
                self.stats.abandoned = self.stats.abandoned.wrapping_add(1);
                warn!(
                    "Cycle: slave {} fc {} abandoned: {}",
                    req.address, req.function, error
                );
                self.publish_diagnostic(sink, req.function, error, 0);
                false
            }
        }
    }

    fn publish_diagnostic<S: EventSink>(
        &mut self,
        sink: &mut S,
        function_code: u8,
        error: ModbusError,
        raw: u32,
    ) {
        self.stats.diagnostics = self.stats.diagnostics.wrapping_add(1);
        sink.emit(&GatewayEvent::Diagnostic {
            function_code,
            error,
            raw,
        });
    }
}
