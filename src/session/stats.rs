use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
}

/// Statistics about the current (or last) recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether recording is currently active
    pub state: SessionState,

    /// ID of the current or last session, if any was started
    pub session_id: Option<Uuid>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Time recorded so far (or in total, once stopped), in seconds
    pub duration_secs: f64,

    /// Current flush interval in seconds
    pub flush_interval_secs: f64,

    /// Readings taken from the meter
    pub readings_captured: usize,

    /// Readings waiting for the next flush
    pub readings_buffered: usize,

    /// Records successfully persisted
    pub records_written: usize,

    /// Readings contained in persisted records
    pub readings_persisted: usize,

    /// Flushes whose batch could not be persisted
    pub persist_failures: usize,

    /// Readings lost to persist failures
    pub readings_dropped: usize,

    /// Name of the most recent persisted record
    pub last_record: Option<String>,

    /// Operator-facing status line
    pub status: String,
}
