use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::source::{Level, MeterError, MeteringSource};

/// Configuration for the synthetic meter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticMeterConfig {
    /// Quietest average level produced (dB)
    pub floor_db: f32,
    /// Loudest average level produced (dB)
    pub ceiling_db: f32,
    /// Length of one full quiet-loud-quiet cycle in seconds
    pub period_secs: f64,
}

impl Default for SyntheticMeterConfig {
    fn default() -> Self {
        Self {
            floor_db: -60.0,
            ceiling_db: -6.0,
            period_secs: 20.0,
        }
    }
}

/// Deterministic stand-in for a hardware meter
///
/// Produces a sine-shaped average level between `floor_db` and `ceiling_db`,
/// advancing one step per read. Peak sits 3 dB above average, capped at 0 dB.
pub struct SyntheticMeter {
    config: SyntheticMeterConfig,
    step: Duration,
    reads: AtomicU64,
    available: AtomicBool,
}

impl SyntheticMeter {
    /// `step` is the simulated time between two reads (normally the poll period)
    pub fn new(config: SyntheticMeterConfig, step: Duration) -> Self {
        Self {
            config,
            step,
            reads: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the device going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful reads so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn level_at(&self, index: u64) -> Level {
        let elapsed = self.step.as_secs_f64() * index as f64;
        let period = if self.config.period_secs > 0.0 {
            self.config.period_secs
        } else {
            1.0
        };

        // 0.0 at the floor, 1.0 at the ceiling
        let phase = 0.5 - 0.5 * (TAU * elapsed / period).cos();
        let span = self.config.ceiling_db - self.config.floor_db;
        let average = self.config.floor_db + span * phase as f32;

        Level::new(average, (average + 3.0).min(0.0))
    }
}

impl MeteringSource for SyntheticMeter {
    fn read_level(&self) -> Result<Level, MeterError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(MeterError::Unavailable(
                "synthetic meter switched off".to_string(),
            ));
        }

        let index = self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.level_at(index))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> SyntheticMeter {
        SyntheticMeter::new(SyntheticMeterConfig::default(), Duration::from_millis(500))
    }

    #[test]
    fn test_starts_at_floor() {
        let level = meter().read_level().unwrap();
        assert!((level.average - -60.0).abs() < 1e-4);
        assert!((level.peak - -57.0).abs() < 1e-4);
    }

    #[test]
    fn test_reaches_ceiling_half_way_through_period() {
        let meter = meter();
        // 20s period at 0.5s steps: read index 20 is the midpoint
        for _ in 0..20 {
            meter.read_level().unwrap();
        }
        let level = meter.read_level().unwrap();
        assert!((level.average - -6.0).abs() < 1e-3, "got {}", level.average);
        assert!(level.peak <= 0.0);
    }

    #[test]
    fn test_levels_stay_in_range() {
        let meter = meter();
        for _ in 0..100 {
            let level = meter.read_level().unwrap();
            assert!(level.average >= -60.0 - 1e-3 && level.average <= -6.0 + 1e-3);
            assert!(level.peak >= level.average);
        }
        assert_eq!(meter.reads(), 100);
    }

    #[test]
    fn test_unavailable_meter_errors() {
        let meter = meter();
        meter.set_available(false);
        assert!(matches!(meter.read_level(), Err(MeterError::Unavailable(_))));
        assert_eq!(meter.reads(), 0);

        meter.set_available(true);
        assert!(meter.read_level().is_ok());
    }
}
