//! Configuration management for Chartflow.
//!
//! Settings live in `chartflow.toml` under the data directory. Every key
//! has a default so a missing or partial file still yields a usable
//! configuration.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::EntityRecord;

/// Default minimum confidence for auto-acceptance.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Confidence thresholds for the router: a default plus optional
/// per-entity-type overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub default_threshold: f64,
    /// Override by entity type (opaque extraction-taxonomy strings).
    pub per_type: HashMap<String, f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            per_type: HashMap::new(),
        }
    }
}

impl Thresholds {
    /// The threshold applicable to an entity type.
    pub fn for_type(&self, entity_type: &str) -> f64 {
        self.per_type
            .get(entity_type)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// Whether an entity meets its applicable threshold. Confidence
    /// exactly at threshold auto-accepts.
    pub fn accepts(&self, entity: &EntityRecord) -> bool {
        entity.confidence >= self.for_type(&entity.entity_type)
    }
}

/// Retry budget for transient extraction and dispatch failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root data directory (database, stored objects, config file).
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub thresholds: Thresholds,
    pub retry: RetryPolicy,
    /// Upper bound on a single extraction call.
    pub extraction_timeout_secs: u64,
    /// Upper bound on a review-task submission call.
    pub review_submit_timeout_secs: u64,
    /// How long a pending review task may wait for reviewer input before
    /// it expires. Human review can take far longer than extraction, so
    /// this is configured separately and defaults to days.
    pub review_expiry_secs: u64,
    /// How often the expiry sweep runs.
    pub expiry_sweep_interval_secs: u64,
    /// Parallel document workers.
    pub workers: usize,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            thresholds: Thresholds::default(),
            retry: RetryPolicy::default(),
            extraction_timeout_secs: 120,
            review_submit_timeout_secs: 30,
            review_expiry_secs: 3 * 24 * 60 * 60,
            expiry_sweep_interval_secs: 60,
            workers: 4,
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl Settings {
    /// Resolve the data directory: explicit argument, `CHARTFLOW_DATA_DIR`,
    /// then the platform data dir.
    pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir;
        }
        if let Ok(dir) = std::env::var("CHARTFLOW_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chartflow")
    }

    /// Load settings from `chartflow.toml` in the data directory, falling
    /// back to defaults when the file is absent.
    pub fn load(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = Self::resolve_data_dir(data_dir);
        let config_path = data_dir.join("chartflow.toml");

        let mut settings = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&raw)?
        } else {
            Settings::default()
        };
        settings.data_dir = data_dir;
        Ok(settings)
    }

    /// Create the data directory layout and write a default config file
    /// if one does not exist yet.
    pub fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = Self::load(data_dir)?;
        fs::create_dir_all(settings.objects_dir())?;
        let config_path = settings.config_path();
        if !config_path.exists() {
            fs::write(&config_path, toml::to_string_pretty(&settings)?)?;
        }
        Ok(settings)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("chartflow.toml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chartflow.db")
    }

    /// Directory for stored document objects.
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn extraction_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn review_submit_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.review_submit_timeout_secs)
    }

    pub fn review_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.review_expiry_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityRecord;

    #[test]
    fn test_threshold_fallback_and_override() {
        let mut thresholds = Thresholds::default();
        thresholds.per_type.insert("medication".to_string(), 0.95);

        assert_eq!(thresholds.for_type("diagnosis"), DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(thresholds.for_type("medication"), 0.95);
    }

    #[test]
    fn test_confidence_at_threshold_accepts() {
        let thresholds = Thresholds::default();
        let entity = EntityRecord::automated("diagnosis", "asthma", 0.8);
        assert!(thresholds.accepts(&entity));
        let entity = EntityRecord::automated("diagnosis", "asthma", 0.799);
        assert!(!thresholds.accepts(&entity));
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let parsed: Settings = toml::from_str("workers = 9\n").unwrap();
        assert_eq!(parsed.workers, 9);
        assert_eq!(parsed.port, Settings::default().port);
        assert_eq!(
            parsed.thresholds.default_threshold,
            DEFAULT_CONFIDENCE_THRESHOLD
        );
    }

    #[test]
    fn test_init_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::init(Some(dir.path().to_path_buf())).unwrap();
        assert!(settings.config_path().exists());
        assert!(settings.objects_dir().exists());

        // Loading again round-trips the defaults.
        let reloaded = Settings::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(reloaded.workers, settings.workers);
    }
}
