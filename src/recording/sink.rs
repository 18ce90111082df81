use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::buffer::Reading;

/// CSV header written at the top of every record
pub const CSV_HEADER: &str = "timestamp,average_power,peak_power";

/// Give up on finding a free name after this many suffixes
const MAX_NAME_SUFFIX: usize = 1000;

/// A drained slice of the sample buffer, ready to be persisted
#[derive(Debug, Clone)]
pub struct Batch {
    /// Record name derived from the flush instant (no extension)
    pub name: String,
    /// When the buffer was drained
    pub flushed_at: DateTime<Utc>,
    /// Readings in append order
    pub readings: Vec<Reading>,
}

impl Batch {
    pub fn new(prefix: &str, flushed_at: DateTime<Utc>, readings: Vec<Reading>) -> Self {
        Self {
            name: record_name(prefix, flushed_at),
            flushed_at,
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// `<prefix>_YYYYMMDD_HHMMSS_mmm`, which sorts chronologically
pub fn record_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, at.format("%Y%m%d_%H%M%S_%3f"))
}

/// Durable storage for drained batches
///
/// `persist` must either store the whole batch or fail without leaving a
/// partial record behind. It is called from a blocking thread.
pub trait PersistenceSink: Send + Sync {
    fn persist(&self, batch: Batch) -> Result<()>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Writes each batch as one CSV file in a fixed directory
pub struct CsvFileSink {
    output_dir: PathBuf,
}

impl CsvFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();

        // Create output directory if it doesn't exist
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        info!("CSV sink writing to {}", output_dir.display());

        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// List record files in the output directory, oldest first
    pub fn records(&self) -> Result<Vec<PathBuf>> {
        let mut records: Vec<PathBuf> = fs::read_dir(&self.output_dir)
            .with_context(|| format!("Failed to list {}", self.output_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        records.sort();
        Ok(records)
    }

    fn write_rows(file: &mut NamedTempFile, readings: &[Reading]) -> io::Result<()> {
        let mut writer = BufWriter::new(file.as_file_mut());
        writeln!(writer, "{}", CSV_HEADER)?;
        for reading in readings {
            writeln!(
                writer,
                "{}.{:06},{},{}",
                reading.timestamp.timestamp(),
                reading.timestamp.timestamp_subsec_micros(),
                reading.average_level,
                reading.peak_level
            )?;
        }
        writer.flush()
    }

    fn candidate_path(&self, name: &str, suffix: usize) -> PathBuf {
        if suffix == 0 {
            self.output_dir.join(format!("{}.csv", name))
        } else {
            self.output_dir.join(format!("{}_{:03}.csv", name, suffix))
        }
    }
}

impl PersistenceSink for CsvFileSink {
    fn persist(&self, batch: Batch) -> Result<()> {
        let mut file = NamedTempFile::new_in(&self.output_dir).with_context(|| {
            format!("Failed to create temp file in {}", self.output_dir.display())
        })?;

        Self::write_rows(&mut file, &batch.readings)
            .with_context(|| format!("Failed to write record {}", batch.name))?;
        file.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync record {}", batch.name))?;

        // Two flushes inside the same millisecond get _001, _002, ... suffixes,
        // which still sort after the bare name
        for suffix in 0..MAX_NAME_SUFFIX {
            let path = self.candidate_path(&batch.name, suffix);
            match file.persist_noclobber(&path) {
                Ok(_) => {
                    debug!("Wrote {} readings to {}", batch.len(), path.display());
                    return Ok(());
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    file = e.file;
                }
                Err(e) => {
                    return Err(e.error)
                        .with_context(|| format!("Failed to persist {}", path.display()));
                }
            }
        }

        anyhow::bail!("No free file name for record {}", batch.name)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Keeps batches in memory
///
/// Useful for embedding the recorder and for tests; `set_failing(true)`
/// makes every subsequent persist fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Batch>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of every batch persisted so far
    pub fn batches(&self) -> Vec<Batch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Batch sizes in persist order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Batch::len).collect()
    }
}

impl PersistenceSink for MemorySink {
    fn persist(&self, batch: Batch) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory sink rejected batch {}", batch.name);
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(record_name("decibel_data", at), "decibel_data_20240309_070501_042");
    }

    #[test]
    fn test_record_names_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        let much_later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let names = [
            record_name("p", earlier),
            record_name("p", later),
            record_name("p", much_later),
        ];
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_memory_sink_failing() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        assert!(sink.persist(Batch::new("p", Utc::now(), Vec::new())).is_err());
        assert!(sink.batches().is_empty());

        sink.set_failing(false);
        sink.persist(Batch::new("p", Utc::now(), Vec::new())).unwrap();
        assert_eq!(sink.batch_sizes(), vec![0]);
    }
}
