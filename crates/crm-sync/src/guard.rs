//! Scoped re-entrancy guard for collection reloads
//!
//! A reload requested while another is in flight is dropped, not queued.
//! The permit releases on drop, so an early return, an error or a panic
//! cannot leave the guard stuck.

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-slot guard
#[derive(Debug, Default)]
pub struct RefreshGuard {
    in_flight: AtomicBool,
}

impl RefreshGuard {
    /// Create idle guard
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot, or `None` if a refresh already holds it
    #[must_use]
    pub fn try_acquire(&self) -> Option<RefreshPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit { guard: self })
    }

    /// Check if a refresh currently holds the slot
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof of holding the refresh slot; releases it on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct RefreshPermit<'a> {
    guard: &'a RefreshGuard,
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}
