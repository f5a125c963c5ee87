use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Clinimetrics";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV_VAR: &str = "CLINIMETRICS_CONFIG";

/// Default interval between ETL runs: 6 hours.
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Patient ids per telemetry query (bounds IN-clause parameter counts).
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Evidence rows per insert batch.
pub const DEFAULT_EVIDENCE_BATCH_SIZE: usize = 300;

/// Get the application data directory
/// ~/Clinimetrics/ on all platforms. Falls back to the working directory
/// when no home directory can be resolved (service accounts).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the JSON config file.
pub fn default_config_path() -> PathBuf {
    app_data_dir().join("clinimetrics.json")
}

/// Directory holding per-practice SQLite databases when a practice
/// entry does not name an explicit path.
pub fn practices_dir() -> PathBuf {
    app_data_dir().join("practices")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,clinimetrics_lib=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One statically configured practice and the database it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeConfig {
    pub practice_id: String,
    #[serde(default)]
    pub practice_name: String,
    /// SQLite file holding this practice's telemetry and metric tables.
    /// Defaults to `<practices_dir>/<practice_id>.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl PracticeConfig {
    pub fn new(practice_id: impl Into<String>, database_path: impl Into<PathBuf>) -> Self {
        let practice_id = practice_id.into();
        Self {
            practice_name: practice_id.clone(),
            practice_id,
            database_path: Some(database_path.into()),
        }
    }

    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| practices_dir().join(format!("{}.db", self.practice_id)))
    }
}

/// ETL tunables. Every field has a default so a partial JSON file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Practices processed on every run, in order.
    pub practices: Vec<PracticeConfig>,
    /// Seconds between scheduled runs.
    pub run_interval_secs: u64,
    /// Patient ids per telemetry query.
    pub chunk_size: usize,
    /// Evidence rows per insert batch.
    pub evidence_batch_size: usize,
    /// Run once immediately when the scheduler starts.
    pub run_on_start: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            practices: Vec::new(),
            run_interval_secs: DEFAULT_RUN_INTERVAL_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            evidence_batch_size: DEFAULT_EVIDENCE_BATCH_SIZE,
            run_on_start: true,
        }
    }
}

impl EtlConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config path: explicit argument, then `CLINIMETRICS_CONFIG`,
    /// then the default location.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(default_config_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.evidence_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "evidence_batch_size must be greater than 0".into(),
            ));
        }
        if self.run_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "run_interval_secs must be greater than 0".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for practice in &self.practices {
            if practice.practice_id.trim().is_empty() {
                return Err(ConfigError::Invalid("practice_id must not be empty".into()));
            }
            if !seen.insert(practice.practice_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate practice_id {}",
                    practice.practice_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Clinimetrics"));
    }

    #[test]
    fn practices_dir_under_app_data() {
        let practices = practices_dir();
        assert!(practices.starts_with(app_data_dir()));
        assert!(practices.ends_with("practices"));
    }

    #[test]
    fn defaults_match_batch_constants() {
        let config = EtlConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.evidence_batch_size, 300);
        assert_eq!(config.run_interval_secs, 21_600);
        assert!(config.run_on_start);
        assert!(config.practices.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EtlConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"practices": [{"practice_id": "us-east-1_abc", "database_path": "/tmp/abc.db"}],
                "run_interval_secs": 300}"#,
        )
        .unwrap();

        let config = EtlConfig::load(&path).unwrap();
        assert_eq!(config.run_interval_secs, 300);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.practices.len(), 1);
        assert_eq!(
            config.practices[0].resolved_database_path(),
            PathBuf::from("/tmp/abc.db")
        );
    }

    #[test]
    fn default_database_path_uses_practice_id() {
        let practice = PracticeConfig {
            practice_id: "p1".into(),
            practice_name: String::new(),
            database_path: None,
        };
        assert!(practice.resolved_database_path().ends_with("practices/p1.db"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EtlConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let config = EtlConfig {
            chunk_size: 0,
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn duplicate_practice_rejected() {
        let config = EtlConfig {
            practices: vec![
                PracticeConfig::new("p1", "/tmp/a.db"),
                PracticeConfig::new("p1", "/tmp/b.db"),
            ],
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn explicit_path_wins() {
        let path = EtlConfig::resolve_path(Some(PathBuf::from("/etc/clinimetrics.json")));
        assert_eq!(path, PathBuf::from("/etc/clinimetrics.json"));
    }
}
