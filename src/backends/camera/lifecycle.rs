// SPDX-License-Identifier: GPL-3.0-only

//! Release accounting for single-use frame handles
//!
//! Raw captured frames and raster drawing surfaces must each be released
//! exactly once. Every handle is minted from a [`HandleTracker`]; releasing it
//! consumes the handle, so a second release cannot be written. Dropping a
//! handle without releasing it is a leak: it is counted and logged so the
//! defect is visible in logs and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace};

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    leaked: AtomicU64,
}

/// Shared counters for one family of handles
#[derive(Debug, Clone)]
pub struct HandleTracker {
    kind: &'static str,
    counters: Arc<Counters>,
}

impl HandleTracker {
    /// Create a tracker; `kind` names the handle family in logs
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Mint a new live handle
    pub fn acquire(&self) -> TrackedHandle {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        TrackedHandle {
            tracker: self.clone(),
            released: false,
        }
    }

    /// Name of the handle family
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Total handles minted
    pub fn acquired(&self) -> u64 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    /// Handles released explicitly
    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Handles dropped without an explicit release
    pub fn leaked(&self) -> u64 {
        self.counters.leaked.load(Ordering::SeqCst)
    }

    /// Handles currently alive
    pub fn outstanding(&self) -> u64 {
        self.acquired()
            .saturating_sub(self.released())
            .saturating_sub(self.leaked())
    }

    /// True when every minted handle was released and none leaked
    pub fn is_balanced(&self) -> bool {
        self.outstanding() == 0 && self.leaked() == 0
    }
}

/// A live single-use handle
///
/// Call [`TrackedHandle::release`] exactly once. Dropping it unreleased
/// records a leak.
#[derive(Debug)]
pub struct TrackedHandle {
    tracker: HandleTracker,
    released: bool,
}

impl TrackedHandle {
    /// Release the handle
    pub fn release(mut self) {
        self.released = true;
        self.tracker.counters.released.fetch_add(1, Ordering::SeqCst);
        trace!(kind = self.tracker.kind, "Handle released");
    }
}

impl Drop for TrackedHandle {
    fn drop(&mut self) {
        if !self.released {
            self.tracker.counters.leaked.fetch_add(1, Ordering::SeqCst);
            error!(
                kind = self.tracker.kind,
                "Handle dropped without release (resource leak invariant violated)"
            );
        }
    }
}
