use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One level measurement as reported by a meter
///
/// Both channels are in decibels relative to full scale (0 dB = clipping,
/// quieter input is more negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Average power over the meter's window
    pub average: f32,
    /// Peak power over the meter's window
    pub peak: f32,
}

impl Level {
    pub fn new(average: f32, peak: f32) -> Self {
        Self { average, peak }
    }
}

/// Failure to obtain a reading from the input device
///
/// Always fatal to the recording session that observed it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeterError {
    #[error("audio input unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied for audio input: {0}")]
    PermissionDenied(String),
}

/// Level metering source trait
///
/// Implementations wrap a platform capture API that already computes
/// average/peak power. Opening and tearing down the device is the
/// implementation's business; the session only calls `read_level`.
pub trait MeteringSource: Send + Sync {
    /// Read the level for "now"
    fn read_level(&self) -> Result<Level, MeterError>;

    /// Get source name for logging
    fn name(&self) -> &str;
}
