//! Single-flight guard for feed fetches.

use std::sync::atomic::{AtomicBool, Ordering};

/// At most one page request may be outstanding. Acquiring hands out a
/// [`RequestPermit`]; the lock is released when the permit drops, on every
/// exit path including failures and cancellation.
#[derive(Debug, Default)]
pub struct RequestLock {
    held: AtomicBool,
}

impl RequestLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free.
    pub fn try_acquire(&self) -> Option<RequestPermit<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RequestPermit { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`RequestLock`].
#[derive(Debug)]
pub struct RequestPermit<'a> {
    lock: &'a RequestLock,
}

impl Drop for RequestPermit<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
