use super::config::SessionConfig;
use super::stats::{SessionState, SessionStats};
use crate::meter::{Level, MeterError, MeteringSource};
use crate::recording::{
    sampler, Batch, FlushInterval, IntervalError, PersistenceSink, Reading, SampleBuffer,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of trying to start a periodic flush from the sampling loop
pub(crate) enum PeriodicFlush {
    /// Another flush is still persisting; try again next tick
    Busy,
    /// Nothing buffered
    Empty,
    /// Drained batch plus the flush lock, held until it is persisted
    Ready(Batch, OwnedMutexGuard<()>),
}

#[derive(Debug, Default)]
struct SessionInfo {
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    last_record: Option<String>,
}

/// State shared between the controller and the sampling loop
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) buffer: SampleBuffer,
    pub(crate) interval: FlushInterval,
    pub(crate) meter: Arc<dyn MeteringSource>,
    sink: Arc<dyn PersistenceSink>,

    /// Serializes flushes; periodic flushes move an owned guard into their
    /// persist task
    flush_lock: Arc<Mutex<()>>,

    is_recording: AtomicBool,
    status: watch::Sender<String>,
    info: std::sync::Mutex<SessionInfo>,

    readings_captured: AtomicUsize,
    records_written: AtomicUsize,
    readings_persisted: AtomicUsize,
    persist_failures: AtomicUsize,
    readings_dropped: AtomicUsize,
}

impl Shared {
    pub(crate) fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    pub(crate) fn set_status(&self, status: impl Into<String>) {
        self.status.send_replace(status.into());
    }

    /// Append one reading and show it on the status line
    pub(crate) fn record(&self, level: Level) {
        self.buffer.append(Reading::now(level));
        self.readings_captured.fetch_add(1, Ordering::SeqCst);
        self.set_status(format!("Decibels: {:.2} dB", level.average));
    }

    /// Drain and persist, waiting for any flush already in progress
    ///
    /// Returns the failure message if the batch could not be saved.
    pub(crate) async fn flush(&self) -> Option<String> {
        let _guard = self.flush_lock.lock().await;
        match self.drain_batch() {
            Some(batch) => self.persist(batch).await,
            None => None,
        }
    }

    /// Drain for a periodic flush without ever waiting on the flush lock
    pub(crate) fn begin_periodic_flush(&self) -> PeriodicFlush {
        let Ok(guard) = Arc::clone(&self.flush_lock).try_lock_owned() else {
            return PeriodicFlush::Busy;
        };

        match self.drain_batch() {
            Some(batch) => PeriodicFlush::Ready(batch, guard),
            None => PeriodicFlush::Empty,
        }
    }

    /// Hand a batch to the sink; failures are counted and the batch dropped
    pub(crate) async fn persist(&self, batch: Batch) -> Option<String> {
        let name = batch.name.clone();
        let count = batch.len();
        let sink = Arc::clone(&self.sink);

        let failure = match tokio::task::spawn_blocking(move || sink.persist(batch)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(e) => Some(format!("persist task panicked: {}", e)),
        };

        match failure {
            None => {
                self.records_written.fetch_add(1, Ordering::SeqCst);
                self.readings_persisted.fetch_add(count, Ordering::SeqCst);
                self.lock_info().last_record = Some(name.clone());
                info!("Saved {} readings to {} ({})", count, name, self.sink.name());
                None
            }
            Some(reason) => {
                self.persist_failures.fetch_add(1, Ordering::SeqCst);
                self.readings_dropped.fetch_add(count, Ordering::SeqCst);
                error!("Failed to save {} ({} readings dropped): {}", name, count, reason);
                let message = format!("failed to save {}: {}", name, reason);
                self.set_status(format!("Failed to save {}: {}", name, reason));
                Some(message)
            }
        }
    }

    fn drain_batch(&self) -> Option<Batch> {
        let readings = self.buffer.drain_all();
        if readings.is_empty() {
            return None;
        }
        Some(Batch::new(&self.config.record_prefix, Utc::now(), readings))
    }

    fn lock_info(&self) -> std::sync::MutexGuard<'_, SessionInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset_counters(&self) {
        for counter in [
            &self.readings_captured,
            &self.records_written,
            &self.readings_persisted,
            &self.persist_failures,
            &self.readings_dropped,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

/// The one live sampling loop of a recording session
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), MeterError>>,
}

/// Idle/Recording state machine driving the sampling loop
///
/// Commands are cheap to call from any task. `stop` only returns after the
/// loop has exited and the final flush has completed.
pub struct SessionController {
    shared: Arc<Shared>,

    /// Serializes start/stop; `Some` while a sampling loop may be alive
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    /// Create a new idle controller
    pub fn new(
        config: SessionConfig,
        meter: Arc<dyn MeteringSource>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self> {
        if config.poll_period.is_zero() {
            anyhow::bail!("Poll period must be positive");
        }
        let interval =
            FlushInterval::new(config.flush_interval).context("Invalid initial flush interval")?;

        info!(
            "Session controller ready: meter={}, sink={}, poll={:?}, flush every {:?}",
            meter.name(),
            sink.name(),
            config.poll_period,
            config.flush_interval
        );

        let (status, _) = watch::channel("Idle".to_string());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                buffer: SampleBuffer::new(),
                interval,
                meter,
                sink,
                flush_lock: Arc::new(Mutex::new(())),
                is_recording: AtomicBool::new(false),
                status,
                info: std::sync::Mutex::new(SessionInfo::default()),
                readings_captured: AtomicUsize::new(0),
                records_written: AtomicUsize::new(0),
                readings_persisted: AtomicUsize::new(0),
                persist_failures: AtomicUsize::new(0),
                readings_dropped: AtomicUsize::new(0),
            }),
            active: Mutex::new(None),
        })
    }

    /// Start recording
    ///
    /// Returns `false` without doing anything if a session is already running.
    pub async fn start(&self) -> bool {
        let mut active = self.active.lock().await;

        if let Some(session) = active.take() {
            if self.shared.is_recording() && !session.task.is_finished() {
                warn!("Recording already started ({})", session.id);
                *active = Some(session);
                return false;
            }

            // The previous loop ended on its own (meter failure or panic)
            Self::reap(session).await;
            self.shared.flush().await;
        }

        let stale = self.shared.buffer.drain_all();
        if !stale.is_empty() {
            warn!("Discarding {} readings left over from a previous session", stale.len());
        }

        let id = Uuid::new_v4();
        self.shared.reset_counters();
        {
            let mut info = self.shared.lock_info();
            *info = SessionInfo {
                session_id: Some(id),
                started_at: Some(Utc::now()),
                ..SessionInfo::default()
            };
        }
        self.shared.is_recording.store(true, Ordering::SeqCst);
        self.shared.set_status("Recording...");

        info!("Starting recording session: {}", id);

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let result = sampler::run(Arc::clone(&shared), loop_cancel).await;

            if let Err(e) = &result {
                error!("Recording session {} failed: {}", id, e);
                let save_error = shared.flush().await;
                shared.lock_info().stopped_at = Some(Utc::now());
                shared.is_recording.store(false, Ordering::SeqCst);
                match save_error {
                    Some(save_error) => shared.set_status(format!("Error: {} ({})", e, save_error)),
                    None => shared.set_status(format!("Error: {}", e)),
                }
            }

            result
        });

        *active = Some(ActiveSession { id, cancel, task });

        true
    }

    /// Stop recording
    ///
    /// Returns `false` if no session was recording. Otherwise waits for the
    /// sampling loop to exit, flushes whatever is left and goes idle.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;

        let Some(session) = active.take() else {
            warn!("Recording not active");
            return false;
        };

        let was_recording = self.shared.is_recording();
        let id = session.id;

        if was_recording {
            info!("Stopping recording session: {}", id);
        }

        session.cancel.cancel();
        let meter_error = Self::reap(session).await;

        // Loop has quiesced: nothing else appends from here on
        let save_error = self.shared.flush().await;

        if !was_recording {
            debug!("Session {} had already ended", id);
            return false;
        }

        // Both the loop's own failure and a failed final save stay visible
        let problems: Vec<String> = meter_error.into_iter().chain(save_error).collect();
        let status = if problems.is_empty() {
            "Stopped".to_string()
        } else {
            format!("Stopped ({})", problems.join("; "))
        };

        self.shared.lock_info().stopped_at = Some(Utc::now());
        self.shared.is_recording.store(false, Ordering::SeqCst);
        self.shared.set_status(status);

        info!("Recording session stopped: {}", id);

        true
    }

    /// Change the flush interval; invalid values keep the current one
    pub fn set_interval(&self, interval: Duration) -> Result<Duration, IntervalError> {
        Self::log_interval_update(self.shared.interval.set(interval))
    }

    pub fn set_interval_secs(&self, secs: f64) -> Result<Duration, IntervalError> {
        Self::log_interval_update(self.shared.interval.set_secs(secs))
    }

    /// Parse operator input such as `"30"` as seconds
    pub fn set_interval_str(&self, text: &str) -> Result<Duration, IntervalError> {
        Self::log_interval_update(self.shared.interval.set_str(text))
    }

    pub fn flush_interval(&self) -> Duration {
        self.shared.interval.get()
    }

    pub fn poll_period(&self) -> Duration {
        self.shared.config.poll_period
    }

    pub fn state(&self) -> SessionState {
        if self.shared.is_recording() {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    /// Current status line
    pub fn status(&self) -> String {
        self.shared.status.borrow().clone()
    }

    /// Watch the status line change
    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.shared.status.subscribe()
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let shared = &self.shared;
        let info = shared.lock_info();

        let duration_secs = match info.started_at {
            Some(started) => {
                let end = info.stopped_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        };

        SessionStats {
            state: self.state(),
            session_id: info.session_id,
            started_at: info.started_at,
            duration_secs,
            flush_interval_secs: shared.interval.get().as_secs_f64(),
            readings_captured: shared.readings_captured.load(Ordering::SeqCst),
            readings_buffered: shared.buffer.len(),
            records_written: shared.records_written.load(Ordering::SeqCst),
            readings_persisted: shared.readings_persisted.load(Ordering::SeqCst),
            persist_failures: shared.persist_failures.load(Ordering::SeqCst),
            readings_dropped: shared.readings_dropped.load(Ordering::SeqCst),
            last_record: info.last_record.clone(),
            status: self.status(),
        }
    }

    /// Wait for the sampling task; returns what ended it abnormally, if anything
    async fn reap(session: ActiveSession) -> Option<String> {
        match session.task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                debug!("Session {} ended with meter error: {}", session.id, e);
                Some(format!("meter error: {}", e))
            }
            Err(e) => {
                error!("Sampling task for {} panicked: {}", session.id, e);
                Some(format!("sampling task failed: {}", e))
            }
        }
    }

    fn log_interval_update(
        result: Result<Duration, IntervalError>,
    ) -> Result<Duration, IntervalError> {
        match &result {
            Ok(interval) => info!("Flush interval set to {:?}", interval),
            Err(e) => debug!("Ignoring flush interval update: {}", e),
        }
        result
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            if !session.task.is_finished() {
                warn!(
                    "Session controller dropped while recording {}; {} buffered readings not flushed",
                    session.id,
                    self.shared.buffer.len()
                );
            }
            session.cancel.cancel();
        }
    }
}
