//! Link statistics.
//!
//! Counters kept by the cycle controller and logged by the bus worker once a
//! minute.  They never leave the device; the CAN side only sees individual
//! diagnostics.

use log::info;
use serde::Serialize;

use crate::modbus::ModbusError;

/// Cumulative counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Bus exchanges started, retries included.
    pub attempts: u32,
    /// Exchanges that were run a second time.
    pub retries: u32,
    /// Frames given up on after the retry.
    pub abandoned: u32,
    /// Sensor values published.
    pub values: u32,
    /// Diagnostics published.
    pub diagnostics: u32,
    /// Failures per [`ModbusError`] class, indexed by `code() - 1`.
    pub errors: [u32; ModbusError::ALL.len()],
    /// Receive bytes lost to a full queue.
    pub rx_dropped: u32,
    /// Write frames lost to a full relay queue.
    pub relay_dropped: u32,
}

impl LinkStats {
    pub fn record_error(&mut self, error: ModbusError) {
        let slot = usize::from(error.code() - 1);
        self.errors[slot] = self.errors[slot].saturating_add(1);
    }

    pub fn errors_of(&self, error: ModbusError) -> u32 {
        self.errors[usize::from(error.code() - 1)]
    }

    pub fn log_summary(&self, uptime_ms: u64) {
        info!(
            "Link: up {}s attempts={} retries={} abandoned={} values={} diagnostics={}",
            uptime_ms / 1000,
            self.attempts,
            self.retries,
            self.abandoned,
            self.values,
            self.diagnostics
        );
        info!(
            "Link: errors no_resp={} len={} crc={} invalid={} fc={} actor={} rx_dropped={} relay_dropped={}",
            self.errors[0],
            self.errors[1],
            self.errors[2],
            self.errors[3],
            self.errors[4],
            self.errors[5],
            self.rx_dropped,
            self.relay_dropped
        );
        if let Some(free) = free_heap() {
            info!("Link: heap free {} bytes", free);
        }
    }
}

#[cfg(feature = "espidf")]
fn free_heap() -> Option<u32> {
    // SAFETY: read-only query of the IDF heap allocator.
    Some(unsafe { esp_idf_svc::sys::esp_get_free_heap_size() })
}

#[cfg(not(feature = "espidf"))]
fn free_heap() -> Option<u32> {
    None
}
