//! System clock adapter.
//!
//! - **`espidf`**: `esp_timer_get_time()` for monotonic time and the
//!   FreeRTOS delay for sleeping, so the bus worker yields to other tasks.
//! - **host**: `std::time::Instant` and `std::thread::sleep`.

use crate::app::ports::Clock;

/// Monotonic clock for the bus worker.
pub struct SystemClock {
    #[cfg(not(feature = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "espidf")]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // SAFETY: reads the IDF high-resolution timer; no preconditions.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    fn sleep_ms(&self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

#[cfg(not(feature = "espidf"))]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
