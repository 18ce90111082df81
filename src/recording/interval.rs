use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Rejected flush interval update
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntervalError {
    #[error("flush interval must be positive, got {0}")]
    NotPositive(f64),

    #[error("flush interval is not a finite number of seconds: {0}")]
    NotFinite(f64),

    #[error("flush interval is too large: {0}s")]
    TooLarge(f64),

    #[error("flush interval is not a number: {0:?}")]
    Unparsable(String),
}

/// Time between periodic flushes, shared between the control surface and
/// the sampling loop
///
/// Stored as nanoseconds in an atomic so updates never wait on sampling.
#[derive(Debug)]
pub struct FlushInterval {
    nanos: AtomicU64,
}

impl FlushInterval {
    pub fn new(initial: Duration) -> Result<Self, IntervalError> {
        Ok(Self {
            nanos: AtomicU64::new(to_nanos(initial)?),
        })
    }

    pub fn get(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    /// Replace the interval; on error the previous value is kept
    pub fn set(&self, interval: Duration) -> Result<Duration, IntervalError> {
        let nanos = to_nanos(interval)?;
        self.nanos.store(nanos, Ordering::SeqCst);
        Ok(interval)
    }

    pub fn set_secs(&self, secs: f64) -> Result<Duration, IntervalError> {
        self.set(parse_secs(secs)?)
    }

    /// Accepts whatever an operator typed, e.g. `"30"` or `" 2.5 "`
    pub fn set_str(&self, text: &str) -> Result<Duration, IntervalError> {
        let secs: f64 = text
            .trim()
            .parse()
            .map_err(|_| IntervalError::Unparsable(text.to_string()))?;
        self.set_secs(secs)
    }
}

/// Validate a number of seconds as a flush interval
pub fn parse_secs(secs: f64) -> Result<Duration, IntervalError> {
    if !secs.is_finite() {
        return Err(IntervalError::NotFinite(secs));
    }
    if secs <= 0.0 {
        return Err(IntervalError::NotPositive(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| IntervalError::TooLarge(secs))
}

fn to_nanos(interval: Duration) -> Result<u64, IntervalError> {
    let nanos = u64::try_from(interval.as_nanos())
        .map_err(|_| IntervalError::TooLarge(interval.as_secs_f64()))?;
    if nanos == 0 {
        return Err(IntervalError::NotPositive(0.0));
    }
    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval() -> FlushInterval {
        FlushInterval::new(Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_rejects_zero_negative_and_text() {
        let interval = interval();

        assert_eq!(interval.set_secs(0.0), Err(IntervalError::NotPositive(0.0)));
        assert_eq!(interval.set_secs(-5.0), Err(IntervalError::NotPositive(-5.0)));
        assert!(matches!(
            interval.set_str("abc"),
            Err(IntervalError::Unparsable(_))
        ));
        assert!(interval.set(Duration::ZERO).is_err());

        assert_eq!(interval.get(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_non_finite() {
        let interval = interval();
        assert!(interval.set_secs(f64::NAN).is_err());
        assert!(interval.set_secs(f64::INFINITY).is_err());
        assert!(interval.set_str("inf").is_err());
        assert!(interval.set_secs(1e30).is_err());
        assert_eq!(interval.get(), Duration::from_secs(60));
    }

    #[test]
    fn test_accepts_positive_values() {
        let interval = interval();
        assert_eq!(interval.set_str("30"), Ok(Duration::from_secs(30)));
        assert_eq!(interval.get(), Duration::from_secs(30));

        assert_eq!(interval.set_str(" 2.5 "), Ok(Duration::from_millis(2500)));
        assert_eq!(interval.get(), Duration::from_millis(2500));
    }

    #[test]
    fn test_new_rejects_zero() {
        assert!(FlushInterval::new(Duration::ZERO).is_err());
    }
}
