//! Flashing-in-progress flag shared with the indicator task
//!
//! Written only by the flashing task, read by the indicator. A single
//! atomic word is all the synchronisation either side needs.

use core::sync::atomic::{AtomicBool, Ordering};

/// Whether flash is currently being modified
#[derive(Debug, Default)]
pub struct FlashingFlag(AtomicBool);

impl FlashingFlag {
    /// A cleared flag, usable as a `static`
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark flashing as started
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Mark flashing as done
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether flashing is in progress
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the flag until the returned guard is dropped
    pub fn raise(&self) -> FlashingGuard<'_> {
        self.set();
        FlashingGuard(self)
    }
}

/// Clears the flag when dropped
#[derive(Debug)]
pub struct FlashingGuard<'a>(&'a FlashingFlag);

impl Drop for FlashingGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}
