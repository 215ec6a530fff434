//! Receive path shared between the UART interrupt (or RX pump) and the
//! bus worker.
//!
//! ```text
//! ┌──────────────┐  on_byte_received  ┌──────────────┐  drain_into  ┌──────────────┐
//! │ UART RX ISR  │───────────────────▶│  spsc::Queue │─────────────▶│ Cycle        │
//! │ / RX pump    │                    │  (lock-free) │              │ Controller   │
//! └──────────────┘                    └──────────────┘              └──────────────┘
//! ```
//!
//! The writer never blocks: a byte that does not fit is dropped and
//! counted.  The reader clears the queue before every transmission and after
//! the turnaround pause, so stale bytes never leak into the next exchange.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

/// Queue slots; one is reserved by the SPSC discipline.
pub const RX_QUEUE_SIZE: usize = 64;

/// Bytes the queue can hold at once.
pub const RX_CAPACITY: usize = RX_QUEUE_SIZE - 1;

/// Receive buffer handed to the classifier.
pub type RxBuffer = heapless::Vec<u8, RX_CAPACITY>;

/// Backing storage for the receive path.  Lives in a `static` on the device
/// and on the stack in tests; [`split`](Self::split) hands out the two ends.
pub struct RxChannel {
    queue: Queue<u8, RX_QUEUE_SIZE>,
    dropped: AtomicU32,
}

impl RxChannel {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Split into the interrupt-side writer and the worker-side reader.
    pub fn split(&mut self) -> (RxWriter<'_>, RxReader<'_>) {
        let Self { queue, dropped } = self;
        let dropped: &AtomicU32 = dropped;
        let (producer, consumer) = queue.split();
        (
            RxWriter { producer, dropped },
            RxReader { consumer, dropped },
        )
    }
}

impl Default for RxChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer end, owned by the receive interrupt context.
pub struct RxWriter<'a> {
    producer: Producer<'a, u8, RX_QUEUE_SIZE>,
    dropped: &'a AtomicU32,
}

impl RxWriter<'_> {
    /// Append one received byte.  Returns `false` when the byte was dropped.
    pub fn on_byte_received(&mut self, byte: u8) -> bool {
        if self.producer.enqueue(byte).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// Consumer end, owned by the bus worker.
pub struct RxReader<'a> {
    consumer: Consumer<'a, u8, RX_QUEUE_SIZE>,
    dropped: &'a AtomicU32,
}

impl RxReader<'_> {
    /// At least one byte is waiting.
    pub fn pending(&self) -> bool {
        self.consumer.ready()
    }

    /// Discard everything received so far.
    pub fn clear(&mut self) {
        while self.consumer.dequeue().is_some() {}
    }

    /// Move all pending bytes into `buf`.  Bytes beyond its capacity are
    /// discarded and counted as dropped.
    pub fn drain_into(&mut self, buf: &mut RxBuffer) {
        while let Some(byte) = self.consumer.dequeue() {
            if buf.push(byte).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Bytes lost to overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}
