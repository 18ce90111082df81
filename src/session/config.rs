use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often the meter is polled
    /// Default: 500 milliseconds
    pub poll_period: Duration,

    /// Initial time between periodic flushes
    /// Default: 60 seconds
    pub flush_interval: Duration,

    /// Prefix of every record name (e.g., "decibel_data_20250101_120000_000")
    pub record_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(500),
            flush_interval: Duration::from_secs(60),
            record_prefix: "decibel_data".to_string(),
        }
    }
}
