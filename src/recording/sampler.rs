use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::meter::MeterError;
use crate::session::{PeriodicFlush, Shared};

/// Poll the meter until cancelled or the meter fails
///
/// Periodic flushes persist on tracked tasks; this returns only once all of
/// them have finished, so after it returns nothing touches the buffer.
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) -> Result<(), MeterError> {
    let flushes = TaskTracker::new();

    let result = sample(&shared, &cancel, &flushes).await;

    flushes.close();
    flushes.wait().await;

    result
}

async fn sample(
    shared: &Arc<Shared>,
    cancel: &CancellationToken,
    flushes: &TaskTracker,
) -> Result<(), MeterError> {
    let poll_period = shared.config.poll_period;
    let mut ticker = time::interval(poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_flush = Instant::now();

    info!("Sampling {} every {:?}", shared.meter.name(), poll_period);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Re-read every time so interval changes apply mid-session
        if last_flush.elapsed() >= shared.interval.get() {
            match shared.begin_periodic_flush() {
                PeriodicFlush::Ready(batch, guard) => {
                    let flusher = Arc::clone(shared);
                    flushes.spawn(async move {
                        flusher.persist(batch).await;
                        drop(guard);
                    });
                    last_flush = Instant::now();
                }
                PeriodicFlush::Empty => last_flush = Instant::now(),
                PeriodicFlush::Busy => debug!("Previous flush still persisting, deferring"),
            }
        }

        let level = shared.meter.read_level()?;
        shared.record(level);
    }

    info!("Sampling stopped");

    Ok(())
}
