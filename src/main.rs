//! Modbus gateway firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Rs485Port        SystemClock    ChannelSink     LogEventSink  │
//! │  (SerialPort)     (Clock)        (EventSink)     (EventSink)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────────┐    ┌──────────────────────────┐  │
//! │  │ GatewayService (worker)  │◀───│ BusHandler (CAN side)    │  │
//! │  │ scheduler · controller   │    │ config · relay · online  │  │
//! │  └──────────────────────────┘    └──────────────────────────┘  │
//! │                                                                │
//! │  rs485-rx thread ──▶ RxChannel ──▶ worker                      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Threads:
//! - `rs485-rx` moves bytes from the UART driver into the RX queue.
//! - `modbus` owns the bus and runs [`GatewayService::run`] forever.
//! - `main` serves commands the CAN transport pushes into [`INBOUND`].
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use embassy_sync::signal::Signal;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use log::{error, info, warn};

use modbus_bridge::adapters::channel_sink::{ChannelSink, INBOUND, OUTBOUND};
use modbus_bridge::adapters::log_sink::LogEventSink;
use modbus_bridge::adapters::rs485::Rs485Port;
use modbus_bridge::adapters::rs485::esp::{EspUart, pump_rx};
use modbus_bridge::adapters::time::SystemClock;
use modbus_bridge::app::commands::BusCommand;
use modbus_bridge::app::service::{BusHandler, ConfigMailbox, GatewayService};
use modbus_bridge::config::SerialConfig;
use modbus_bridge::relay::RelayQueue;
use modbus_bridge::rx::RxChannel;

// ── Shared state ──────────────────────────────────────────────

static RELAY: RelayQueue = RelayQueue::new();
static CONFIG_UPDATES: ConfigMailbox = Signal::new();

// SAFETY: split exactly once in `main` before any thread starts; afterwards
// only the two halves (one per thread) touch it.
static mut RX_CHANNEL: RxChannel = RxChannel::new();

/// Idle wait of the CAN-side command loop.
const COMMAND_POLL_MS: u32 = 5;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Modbus gateway v{}               ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. RS-485 line: UART1 TX=GPIO17 RX=GPIO18, DE=GPIO8 ────
    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let pins = peripherals.pins;
    let line = SerialConfig::default();
    let uart = UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(line.baud_rate)),
    )
    .context("UART init")?;
    let uart = Arc::new(Mutex::new(uart));
    let de = PinDriver::output(pins.gpio8).context("DE pin init")?;
    let mut port = Rs485Port::new(EspUart::new(Arc::clone(&uart)), de)
        .map_err(|e| anyhow::anyhow!("RS485 port: {e}"))?;

    // ── 3. Receive path ───────────────────────────────────────
    // SAFETY: see RX_CHANNEL; this is the only reference ever created.
    let rx_channel: &'static mut RxChannel = unsafe { &mut *core::ptr::addr_of_mut!(RX_CHANNEL) };
    let (mut rx_writer, rx_reader) = rx_channel.split();

    thread::Builder::new()
        .name("rs485-rx".into())
        .stack_size(4 * 1024)
        .spawn(move || pump_rx(&uart, &mut rx_writer))
        .context("spawn rs485-rx")?;

    // ── 4. Bus worker ─────────────────────────────────────────
    thread::Builder::new()
        .name("modbus".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            let clock = SystemClock::new();
            let mut sink = (ChannelSink::new(&OUTBOUND), LogEventSink::new());
            let mut service = GatewayService::new(rx_reader, &RELAY, &CONFIG_UPDATES);
            if let Err(e) = service.start(&mut port, &clock) {
                error!("Gateway: serial line not configured: {}", e);
            }
            service.run(&mut port, &clock, &mut sink)
        })
        .context("spawn modbus worker")?;

    // ── 5. CAN-side command loop ──────────────────────────────
    let handler = BusHandler::new(&RELAY, &CONFIG_UPDATES);
    let mut sink = (ChannelSink::new(&OUTBOUND), LogEventSink::new());

    // The controller only lists the gateway once it has announced itself.
    if let Err(e) = handler.handle(BusCommand::StartRequest, &mut sink) {
        warn!("Online announcement failed: {}", e);
    }

    info!("Entering command loop");
    loop {
        while let Ok(message) = INBOUND.try_receive() {
            if let Err(e) = handler.handle(message.as_command(), &mut sink) {
                warn!("Command rejected: {}", e);
            }
        }
        FreeRtos::delay_ms(COMMAND_POLL_MS);
    }
}
