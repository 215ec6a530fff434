//! RS-485 half-duplex port adapter.
//!
//! Implements [`SerialPort`] on top of any byte UART and an `embedded-hal`
//! output pin wired to the transceiver's driver-enable (DE, and /RE tied to
//! it).  DE high drives the bus; DE low listens.
//!
//! The ESP-IDF UART backend and its receive pump live in [`esp`], behind the
//! `espidf` feature.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::{Direction, SerialPort};
use crate::config::{Parity, SerialConfig};
use crate::error::TransportError;

/// Byte-level UART the port drives.
pub trait Uart {
    fn apply(&mut self, config: &SerialConfig) -> Result<(), TransportError>;

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError>;

    /// Block until the last byte has left the shift register.
    fn flush(&mut self) -> Result<(), TransportError>;
}

/// Parity modes the UART hardware can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineParity {
    None,
    Even,
    Odd,
}

/// Map a configured parity onto what the UART supports.  Forced parity
/// (`Space`/`Mark`) is not available and falls back to odd.
pub fn line_parity(parity: Parity) -> LineParity {
    match parity {
        Parity::None => LineParity::None,
        Parity::Even => LineParity::Even,
        Parity::Odd => LineParity::Odd,
        Parity::Space | Parity::Mark => {
            warn!("RS485: parity {:?} not supported by UART, using odd", parity);
            LineParity::Odd
        }
    }
}

pub struct Rs485Port<U, P> {
    uart: U,
    de: P,
    direction: Direction,
}

impl<U: Uart, P: OutputPin> Rs485Port<U, P> {
    /// Wrap `uart` and `de`; the line starts in receive mode.
    pub fn new(uart: U, mut de: P) -> Result<Self, TransportError> {
        de.set_low().map_err(|_| TransportError::DirectionPin)?;
        Ok(Self {
            uart,
            de,
            direction: Direction::Receive,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn into_parts(self) -> (U, P) {
        (self.uart, self.de)
    }
}

impl<U: Uart, P: OutputPin> SerialPort for Rs485Port<U, P> {
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        self.uart.apply(config)
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        match direction {
            Direction::Transmit => {
                self.de.set_high().map_err(|_| TransportError::DirectionPin)?;
            }
            Direction::Receive => {
                // Releasing DE early truncates the last byte on the wire.
                if self.direction == Direction::Transmit {
                    if let Err(e) = self.uart.flush() {
                        warn!("RS485: flush before turnaround failed: {}", e);
                    }
                }
                self.de.set_low().map_err(|_| TransportError::DirectionPin)?;
            }
        }
        self.direction = direction;
        Ok(())
    }

    fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.uart.write_byte(byte)
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(feature = "espidf")]
pub mod esp {
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use esp_idf_hal::delay::{BLOCK, FreeRtos, NON_BLOCK};
    use esp_idf_hal::uart::{UartDriver, config};
    use esp_idf_hal::units::Hertz;
    use log::{info, warn};

    use super::{LineParity, Uart, line_parity};
    use crate::config::{SerialConfig, StopBits};
    use crate::error::TransportError;
    use crate::rx::RxWriter;

    /// Pump sleep when the receive ring buffer is empty.
    const RX_POLL_MS: u32 = 2;

    pub type SharedUart = Arc<Mutex<UartDriver<'static>>>;

    fn lock(driver: &Mutex<UartDriver<'static>>) -> MutexGuard<'_, UartDriver<'static>> {
        driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`Uart`] over the IDF UART driver.  The driver is shared with the
    /// receive pump, which only reads.
    pub struct EspUart {
        driver: SharedUart,
    }

    impl EspUart {
        pub fn new(driver: SharedUart) -> Self {
            Self { driver }
        }
    }

    impl Uart for EspUart {
        fn apply(&mut self, c: &SerialConfig) -> Result<(), TransportError> {
            let parity = match line_parity(c.parity) {
                LineParity::None => config::Parity::ParityNone,
                LineParity::Even => config::Parity::ParityEven,
                LineParity::Odd => config::Parity::ParityOdd,
            };
            let stop_bits = match c.stop_bits {
                StopBits::One => config::StopBits::STOP1,
                StopBits::Two => config::StopBits::STOP2,
            };
            let driver = lock(&self.driver);
            // A 9-bit word is 8 data bits plus the parity bit on this UART.
            driver
                .change_baudrate(Hertz(c.baud_rate))
                .and_then(|_| driver.change_data_bits(config::DataBits::DataBits8))
                .and_then(|_| driver.change_parity(parity))
                .and_then(|_| driver.change_stop_bits(stop_bits))
                .map_err(|e| {
                    warn!("RS485: UART rejected {}: {}", c, e);
                    TransportError::ConfigureFailed
                })?;
            info!("RS485: line set to {}", c);
            Ok(())
        }

        fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
            match lock(&self.driver).write(&[byte]) {
                Ok(1) => Ok(()),
                _ => Err(TransportError::WriteFailed),
            }
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            lock(&self.driver)
                .wait_tx_done(BLOCK)
                .map_err(|_| TransportError::WriteFailed)
        }
    }

    /// Move bytes from the IDF receive ring buffer into the gateway's RX
    /// queue.  Runs forever on its own thread; reads never block while the
    /// driver lock is held.
    pub fn pump_rx(driver: &Mutex<UartDriver<'static>>, writer: &mut RxWriter<'_>) -> ! {
        let mut buf = [0u8; 32];
        loop {
            let read = lock(driver).read(&mut buf, NON_BLOCK);
            match read {
                Ok(0) => FreeRtos::delay_ms(RX_POLL_MS),
                Ok(n) => {
                    for &byte in &buf[..n] {
                        writer.on_byte_received(byte);
                    }
                }
                Err(e) => {
                    warn!("RS485: UART read failed: {}", e);
                    FreeRtos::delay_ms(RX_POLL_MS);
                }
            }
        }
    }
}
