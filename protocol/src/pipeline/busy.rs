//! Single-slot busy flag shared by sign-up and commit.
//!
//! Acquisition is one `compare_exchange`, so two callers racing for the
//! flag cannot both win. The guard clears the flag on drop, on every exit
//! path including `?` and panics.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct BusyFlag {
    held: AtomicBool,
}

/// Proof that the flag is held. Releases it on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    held: &'a AtomicBool,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if another round already holds the flag.
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { held: &self.held })
    }

    pub fn is_busy(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
