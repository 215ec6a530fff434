//! Per-device poll scheduler.
//!
//! Every configured device owns one deadline.  A pass first marks each
//! device whose deadline has elapsed as due, then walks the due devices in
//! configuration order and hands them to the caller, which runs the bus
//! exchange.  There is no priority and no
//! catch-up: a device that was late is polled once and rescheduled from the
//! moment it was polled.
//!
//! ```text
//!            deadline elapsed        frame handed out
//!   ┌──────┐ ───────────────▶ ┌─────┐ ──────────────▶ ┌─────────┐
//!   │ Idle │                  │ Due │                 │ Polling │
//!   └──────┘ ◀─────────────────────────────────────── └─────────┘
//!                         exchange finished
//! ```

use log::{debug, info};

use crate::app::ports::Clock;
use crate::config::{DeviceConfig, MAX_DEVICES};

/// Lifecycle of one device within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Due,
    Polling,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    next_due_ms: u64,
    state: PollState,
}

/// Deadline table for the active device list.
pub struct PollScheduler {
    slots: heapless::Vec<Slot, MAX_DEVICES>,
}

impl PollScheduler {
    pub const fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    /// Start over with `count` devices, all due immediately.
    pub fn reset(&mut self, count: usize) {
        self.slots.clear();
        for _ in 0..count.min(MAX_DEVICES) {
            // bounded by MAX_DEVICES above
            let _ = self.slots.push(Slot::default());
        }
        info!("Scheduler: {} device deadlines reset", self.slots.len());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn next_due_ms(&self, index: usize) -> Option<u64> {
        self.slots.get(index).map(|s| s.next_due_ms)
    }

    pub fn state(&self, index: usize) -> Option<PollState> {
        self.slots.get(index).map(|s| s.state)
    }

    /// Mark every enabled device whose deadline has elapsed at the start of
    /// the pass as [`PollState::Due`].  Returns how many are due.
    pub fn mark_due<C: Clock>(&mut self, clock: &C, devices: &[DeviceConfig]) -> usize {
        let now = clock.now_ms();
        let mut due = 0;
        for (slot, device) in self.slots.iter_mut().zip(devices) {
            if device.cycle.is_enabled() && now >= slot.next_due_ms {
                slot.state = PollState::Due;
                due += 1;
            }
        }
        due
    }

    /// Hand every due device to `poll`, in configuration order.
    ///
    /// The next deadline is taken from `clock` just before the call, so a
    /// slow exchange on one device does not shorten the period of the next.
    /// Returns the number of devices polled.
    pub fn poll_due<C: Clock>(
        &mut self,
        clock: &C,
        devices: &[DeviceConfig],
        mut poll: impl FnMut(usize, &DeviceConfig),
    ) -> usize {
        let mut polled = 0;
        for (index, (slot, device)) in self.slots.iter_mut().zip(devices).enumerate() {
            if slot.state != PollState::Due {
                continue;
            }
            let Some(period) = device.cycle.period_ms() else {
                slot.state = PollState::Idle;
                continue;
            };

            let now = clock.now_ms();
            slot.next_due_ms = now + u64::from(period);
            debug!(
                "Scheduler: device #{} polled at {} ms, next at {} ms",
                index, now, slot.next_due_ms
            );

            slot.state = PollState::Polling;
            poll(index, device);
            slot.state = PollState::Idle;
            polled += 1;
        }
        polled
    }

    /// One pass over `devices`: [`mark_due`](Self::mark_due), then
    /// [`poll_due`](Self::poll_due).
    pub fn poll_pass<C: Clock>(
        &mut self,
        clock: &C,
        devices: &[DeviceConfig],
        poll: impl FnMut(usize, &DeviceConfig),
    ) -> usize {
        self.mark_due(clock, devices);
        self.poll_due(clock, devices, poll)
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}
