use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::meter::Level;

/// A single timestamped level measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Wall-clock time the meter was polled
    pub timestamp: DateTime<Utc>,
    /// Average power (dB)
    pub average_level: f32,
    /// Peak power (dB)
    pub peak_level: f32,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, level: Level) -> Self {
        Self {
            timestamp,
            average_level: level.average,
            peak_level: level.peak,
        }
    }

    /// Tag a level with the current time
    pub fn now(level: Level) -> Self {
        Self::new(Utc::now(), level)
    }
}

/// Ordered, thread-safe buffer of readings
///
/// Appends and drains each take the lock exactly once, so a reading is
/// either in a drained batch or still in the buffer, never split or lost.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    readings: Mutex<Vec<Reading>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, reading: Reading) {
        self.lock().push(reading);
    }

    /// Remove and return everything currently buffered, in append order
    pub fn drain_all(&self) -> Vec<Reading> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A Vec is never left half-updated by push/take, so a poisoned lock
    // still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Vec<Reading>> {
        self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
