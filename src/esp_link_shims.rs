//! `critical-section` 1.x provider for the ESP-IDF std runtime.
//!
//! The relay queue, the config mailbox and the outbound channels are
//! `embassy-sync` primitives over `CriticalSectionRawMutex`.  On the device
//! the CAN task and the bus worker are separate FreeRTOS threads, so the
//! critical section is a process-wide mutex, re-entrant per thread.  Host
//! builds get the implementation from `critical-section`'s `std` feature.

use core::cell::{Cell, RefCell};
use std::sync::{Mutex, MutexGuard, PoisonError};

static SECTION: Mutex<()> = Mutex::new(());

thread_local! {
    static NESTING: Cell<u8> = const { Cell::new(0) };
    static HELD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    let depth = NESTING.get();
    if depth == 0 {
        // No data lives behind this mutex, so a poisoned lock is still usable.
        let guard = SECTION.lock().unwrap_or_else(PoisonError::into_inner);
        HELD.with_borrow_mut(|held| *held = Some(guard));
    }
    NESTING.set(depth.saturating_add(1));
    depth
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_restore: u8) {
    let depth = NESTING.get();
    if depth == 0 {
        return;
    }
    NESTING.set(depth - 1);
    if depth == 1 {
        HELD.with_borrow_mut(|held| *held = None);
    }
}
