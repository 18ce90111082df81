use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::meter::SyntheticMeterConfig;
use crate::recording::interval;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub meter: MeterConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RecorderConfig {
    pub output_dir: String,
    pub record_prefix: String,
    pub flush_interval_secs: f64,
    pub poll_period_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct MeterConfig {
    pub floor_db: f32,
    pub ceiling_db: f32,
    pub period_secs: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        let defaults = SyntheticMeterConfig::default();
        Self {
            floor_db: defaults.floor_db,
            ceiling_db: defaults.ceiling_db,
            period_secs: defaults.period_secs,
        }
    }
}

impl Config {
    /// Load `<path>.toml` (or any format `config` recognises), then apply
    /// `DECIBEL__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("DECIBEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

impl RecorderConfig {
    /// Output directory with `~` expanded
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).as_ref())
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        if self.poll_period_ms == 0 {
            anyhow::bail!("recorder.poll_period_ms must be positive");
        }

        let flush_interval = interval::parse_secs(self.flush_interval_secs)
            .context("Invalid recorder.flush_interval_secs")?;

        Ok(SessionConfig {
            poll_period: Duration::from_millis(self.poll_period_ms),
            flush_interval,
            record_prefix: self.record_prefix.clone(),
        })
    }
}

impl MeterConfig {
    pub fn synthetic(&self) -> SyntheticMeterConfig {
        SyntheticMeterConfig {
            floor_db: self.floor_db,
            ceiling_db: self.ceiling_db,
            period_secs: self.period_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(flush_interval_secs: f64, poll_period_ms: u64) -> RecorderConfig {
        RecorderConfig {
            output_dir: "~/recordings".to_string(),
            record_prefix: "decibel_data".to_string(),
            flush_interval_secs,
            poll_period_ms,
        }
    }

    #[test]
    fn test_session_config_from_recorder() {
        let session = recorder(2.5, 250).session_config().unwrap();
        assert_eq!(session.poll_period, Duration::from_millis(250));
        assert_eq!(session.flush_interval, Duration::from_millis(2500));
        assert_eq!(session.record_prefix, "decibel_data");
    }

    #[test]
    fn test_session_config_rejects_bad_values() {
        assert!(recorder(0.0, 500).session_config().is_err());
        assert!(recorder(-1.0, 500).session_config().is_err());
        assert!(recorder(60.0, 0).session_config().is_err());
    }

    #[test]
    fn test_output_dir_expands_home() {
        let dir = recorder(60.0, 500).output_dir();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("recordings"));
    }

    #[test]
    fn test_load_shipped_config() {
        let cfg = Config::load("config/decibel-recorder").unwrap();
        assert_eq!(cfg.service.name, "decibel-recorder");
        assert_eq!(cfg.recorder.poll_period_ms, 500);
        assert!(cfg.recorder.session_config().is_ok());
    }
}
