//! Environment-driven configuration for the service and the orchestrator client.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Parse { var: &'static str, value: String },
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

/// Conflict API process settings, read from `CONFLICTD_*` variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Server-side bound on every store read.
    pub query_timeout: Duration,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub seed_file: Option<PathBuf>,
    pub drain_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8085,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            query_timeout: Duration::from_millis(250),
            compact_threshold: 1000,
            seed_file: None,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse { var, value }),
        Err(_) => Ok(None),
    }
}

impl ServiceConfig {
    /// Load `.env` if present, then overlay environment variables on the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let d = Self::default();
        let cfg = Self {
            bind: std::env::var("CONFLICTD_BIND").unwrap_or(d.bind),
            port: parse_var("CONFLICTD_PORT")?.unwrap_or(d.port),
            data_dir: std::env::var("CONFLICTD_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            metrics_port: parse_var("CONFLICTD_METRICS_PORT")?,
            query_timeout: parse_var("CONFLICTD_QUERY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.query_timeout),
            compact_threshold: parse_var("CONFLICTD_COMPACT_THRESHOLD")?.unwrap_or(d.compact_threshold),
            seed_file: std::env::var("CONFLICTD_SEED_FILE").ok().map(PathBuf::from),
            drain_timeout: parse_var("CONFLICTD_DRAIN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.drain_timeout),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout.is_zero() {
            return Err(ConfigError::Zero("CONFLICTD_QUERY_TIMEOUT_MS"));
        }
        if self.compact_threshold == 0 {
            return Err(ConfigError::Zero("CONFLICTD_COMPACT_THRESHOLD"));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("schedule.wal")
    }
}

/// Settings the business layer uses when it embeds the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of the Conflict API, e.g. `http://127.0.0.1:8085`.
    pub base_url: String,
    /// Client-side bound on a check call; keeps the interactive path well under a second.
    pub check_timeout: Duration,
    /// After entering degraded mode, skip calls for this long. Zero re-probes on every request.
    pub probe_cooldown: Duration,
    /// Re-validate overlaps under the store's write locks when not forcing.
    pub enforce_exclusion: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8085".into(),
            check_timeout: Duration::from_millis(500),
            probe_cooldown: Duration::ZERO,
            enforce_exclusion: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let d = Self::default();
        let cfg = Self {
            base_url: std::env::var("CONFLICTD_URL").unwrap_or(d.base_url),
            check_timeout: parse_var("CONFLICTD_CHECK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.check_timeout),
            probe_cooldown: parse_var("CONFLICTD_PROBE_COOLDOWN_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.probe_cooldown),
            enforce_exclusion: parse_var("CONFLICTD_ENFORCE_EXCLUSION")?.unwrap_or(d.enforce_exclusion),
        };
        if cfg.check_timeout.is_zero() {
            return Err(ConfigError::Zero("CONFLICTD_CHECK_TIMEOUT_MS"));
        }
        Ok(cfg)
    }
}
