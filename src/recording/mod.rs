//! Sampling, buffering and persistence of level readings
//!
//! - `SampleBuffer`: shared append-only buffer with an atomic drain
//! - `FlushInterval`: lock-free, validated flush cadence
//! - `PersistenceSink`: where drained batches end up (CSV files, memory)
//! - `sampler`: the cancellable polling loop driven by the session

pub mod buffer;
pub mod interval;
pub(crate) mod sampler;
pub mod sink;

pub use buffer::{Reading, SampleBuffer};
pub use interval::{FlushInterval, IntervalError};
pub use sink::{record_name, Batch, CsvFileSink, MemorySink, PersistenceSink};
