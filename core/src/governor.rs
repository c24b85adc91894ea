//! # Concurrency Governor
//!
//! Caps how many external commands one scan tree runs at once. The number
//! of targets processed in parallel is bounded separately by the engine's
//! worker pool; the two limits never interact.

use std::sync::Arc;

use rekon_common::config::ConfigError;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("scan slots are closed")]
pub struct SlotsClosed;

#[derive(Debug, Clone)]
pub struct Governor {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One acquired execution slot. Dropping it returns the slot.
#[derive(Debug)]
pub struct ScanSlot {
    _permit: OwnedSemaphorePermit,
}

impl ScanSlot {
    pub fn release(self) {}
}

impl Governor {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidConcurrency {
                name: "concurrent scans",
                value: capacity,
            });
        }

        Ok(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Waits until fewer than `capacity` commands are running.
    ///
    /// Fails once the governor has been closed; queued callers wake up with
    /// the error instead of a slot.
    pub async fn acquire_scan_slot(&self) -> Result<ScanSlot, SlotsClosed> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| SlotsClosed)?;

        Ok(ScanSlot { _permit: permit })
    }

    pub fn release_scan_slot(&self, slot: ScanSlot) {
        slot.release();
    }

    /// Stops handing out slots. Slots already held stay valid.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }
}
