//! Gateway service: the hexagonal core.
//!
//! Two halves run on two contexts and meet only through lock-free hand-offs:
//!
//! ```text
//!   CAN task                                   bus worker
//!  ┌──────────────┐   ConfigMailbox (Signal)  ┌───────────────────────────┐
//!  │  BusHandler  │──────────────────────────▶│      GatewayService       │
//!  │              │   RelayQueue (Channel)    │  scheduler · controller   │──▶ EventSink
//!  │              │──────────────────────────▶│                           │
//!  └──────────────┘                           └────────────┬──────────────┘
//!                                                          │ SerialPort + Clock
//!                                                          ▼
//!                                                       RS-485
//! ```
//!
//! [`GatewayService`] owns the active configuration, the deadline table and
//! the cycle controller; nobody else writes to the bus.  [`BusHandler`]
//! validates what the CAN side sends and never blocks.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::config::{BusTiming, CONFIG_VERSION, GatewayConfig, TimingMode};
use crate::controller::CycleController;
use crate::error::{Error, Result};
use crate::modbus::RequestContext;
use crate::relay::RelayQueue;
use crate::rx::RxReader;
use crate::scheduler::PollScheduler;
use crate::stats::LinkStats;

use super::commands::BusCommand;
use super::events::GatewayEvent;
use super::ports::{Clock, EventSink, SerialPort};

/// Idle wait at the end of every worker pass.
pub const IDLE_WAIT_MS: u32 = 10;

/// Link statistics are logged this often.
pub const STATS_INTERVAL_MS: u64 = 60_000;

/// Latest accepted configuration, waiting for the worker to pick it up.
/// A newer block overwrites one that has not been applied yet.
pub type ConfigMailbox = Signal<CriticalSectionRawMutex, GatewayConfig>;

// ───────────────────────────────────────────────────────────────
// GatewayService (bus worker side)
// ───────────────────────────────────────────────────────────────

pub struct GatewayService<'a> {
    config: GatewayConfig,
    scheduler: PollScheduler,
    controller: CycleController<'a>,
    relay: &'a RelayQueue,
    config_updates: &'a ConfigMailbox,
    last_stats_ms: u64,
}

impl<'a> GatewayService<'a> {
    /// Build the worker with the power-on configuration.  Call
    /// [`start`](Self::start) before the first pass.
    pub fn new(rx: RxReader<'a>, relay: &'a RelayQueue, config_updates: &'a ConfigMailbox) -> Self {
        let config = GatewayConfig::default();
        let timing = BusTiming::from_config(&config);
        Self {
            config,
            scheduler: PollScheduler::new(),
            controller: CycleController::new(rx, timing),
            relay,
            config_updates,
            last_stats_ms: 0,
        }
    }

    /// Bring the serial line up with the current configuration.
    pub fn start<P: SerialPort, C: Clock>(&mut self, port: &mut P, clock: &C) -> Result<()> {
        self.last_stats_ms = clock.now_ms();
        let config = self.config.clone();
        self.apply_config(config, port)
    }

    /// Switch to `config`: reconfigure the line, recompute timing and make
    /// every device due.  On a transport error the previous configuration
    /// stays active.
    pub fn apply_config<P: SerialPort>(&mut self, config: GatewayConfig, port: &mut P) -> Result<()> {
        if let Err(e) = port.configure(&config.serial) {
            warn!("Gateway: serial {} rejected: {}", config.serial, e);
            return Err(Error::from(e));
        }

        let timing = BusTiming::from_config(&config);
        self.controller.set_timing(timing);
        self.scheduler.reset(config.devices.len());

        info!(
            "Gateway: config v{} {} {} pause={}ms timeout={}ms, {} devices ({} polled)",
            CONFIG_VERSION,
            config.serial,
            match config.timing {
                TimingMode::Automatic => "auto",
                TimingMode::Manual { .. } => "manual",
            },
            timing.inter_frame_pause_ms,
            timing.response_timeout_ms,
            config.devices.len(),
            config.enabled_devices()
        );
        if let Ok(json) = serde_json::to_string(&config.serial) {
            debug!("Gateway: serial {}", json);
        }

        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn timing(&self) -> BusTiming {
        self.controller.timing()
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            relay_dropped: self.relay.dropped(),
            ..self.controller.stats()
        }
    }

    /// One worker pass: pending config, due polls, queued writes, idle.
    /// Returns the number of frames put on the bus (retries not counted).
    pub fn run_once<P: SerialPort, C: Clock, S: EventSink>(
        &mut self,
        port: &mut P,
        clock: &C,
        sink: &mut S,
    ) -> usize {
        if let Some(config) = self.config_updates.try_take() {
            if let Err(e) = self.apply_config(config, port) {
                warn!("Gateway: new config not applied: {}", e);
            }
        }

        let Self {
            config,
            scheduler,
            controller,
            ..
        } = self;
        let mut frames = scheduler.poll_pass(clock, &config.devices, |index, device| {
            let frame = device.poll_frame();
            // index < MAX_DEVICES == 256
            let req = RequestContext::for_device(index as u8, device);
            controller.transact(&frame, &req, port, clock, sink);
        });

        while let Some(frame) = self.relay.try_next() {
            let req = RequestContext::for_relay(&frame);
            self.controller.transact(&frame, &req, port, clock, sink);
            frames += 1;
        }

        let now = clock.now_ms();
        if now.saturating_sub(self.last_stats_ms) >= STATS_INTERVAL_MS {
            self.last_stats_ms = now;
            self.stats().log_summary(now);
        }

        clock.sleep_ms(IDLE_WAIT_MS);
        frames
    }

    /// The bus worker's main loop.
    pub fn run<P: SerialPort, C: Clock, S: EventSink>(
        &mut self,
        port: &mut P,
        clock: &C,
        sink: &mut S,
    ) -> ! {
        info!("Gateway: bus worker running");
        loop {
            self.run_once(port, clock, sink);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BusHandler (CAN side)
// ───────────────────────────────────────────────────────────────

/// Entry point for commands arriving from the CAN side.
#[derive(Clone, Copy)]
pub struct BusHandler<'a> {
    relay: &'a RelayQueue,
    config_updates: &'a ConfigMailbox,
}

impl<'a> BusHandler<'a> {
    pub fn new(relay: &'a RelayQueue, config_updates: &'a ConfigMailbox) -> Self {
        Self {
            relay,
            config_updates,
        }
    }

    pub fn handle<S: EventSink>(&self, command: BusCommand<'_>, sink: &mut S) -> Result<()> {
        match command {
            BusCommand::LoadConfig(blob) => {
                let config = GatewayConfig::from_blob(blob).inspect_err(|e| {
                    warn!("Gateway: config block rejected: {}", e);
                })?;
                info!(
                    "Gateway: config block accepted ({} devices)",
                    config.devices.len()
                );
                self.config_updates.signal(config);
            }
            BusCommand::Write { opcode, data } => {
                self.relay.submit(opcode, data).inspect_err(|e| {
                    warn!("Gateway: write 0x{:02X} rejected: {}", opcode, e);
                })?;
            }
            BusCommand::StartRequest => {
                info!("Gateway: start request, announcing config v{}", CONFIG_VERSION);
                sink.emit(&GatewayEvent::Online {
                    config_version: CONFIG_VERSION,
                });
            }
        }
        Ok(())
    }
}
