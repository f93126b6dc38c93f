//! Livedata configuration
//!
//! Config file: `$LIVEDATA_CONFIG` or /etc/livedata/config.toml.
//! Every field has a default, so a missing file or a partial file is fine.

use crate::error::{LivedataError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "LIVEDATA_CONFIG";

pub const DEFAULT_QUERY_JOB_NAME: &str = "Livedata Query Interface Job";
pub const DEFAULT_CLEANUP_JOB_NAME: &str = "Livedata Cleanup job results";

fn default_listen() -> String {
    "127.0.0.1:7865".to_string()
}

fn default_query_job_name() -> String {
    DEFAULT_QUERY_JOB_NAME.to_string()
}

fn default_cleanup_job_name() -> String {
    DEFAULT_CLEANUP_JOB_NAME.to_string()
}

fn default_soft_time_limit() -> u64 {
    60
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    256
}

fn default_days_to_keep() -> u32 {
    crate::sweeper::DEFAULT_DAYS_TO_KEEP
}

fn default_db_path() -> PathBuf {
    PathBuf::from(crate::result_store::RESULT_DB_PATH)
}

fn default_inventory_path() -> PathBuf {
    PathBuf::from("/etc/livedata/inventory.toml")
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_control_dir() -> PathBuf {
    PathBuf::from("/run/livedata/ssh")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_query_job_name")]
    pub query_job_name: String,
    #[serde(default = "default_cleanup_job_name")]
    pub cleanup_job_name: String,
    /// Soft wall-clock budget for one live query, in seconds
    #[serde(default = "default_soft_time_limit")]
    pub query_soft_time_limit: u64,
    #[serde(default = "default_soft_time_limit")]
    pub cleanup_soft_time_limit: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            query_job_name: default_query_job_name(),
            cleanup_job_name: default_cleanup_job_name(),
            query_soft_time_limit: default_soft_time_limit(),
            cleanup_soft_time_limit: default_soft_time_limit(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl JobsConfig {
    pub fn query_time_limit(&self) -> Duration {
        Duration::from_secs(self.query_soft_time_limit)
    }

    pub fn cleanup_time_limit(&self) -> Duration {
        Duration::from_secs(self.cleanup_soft_time_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,
    /// Hours between scheduled sweeps; 0 disables scheduling
    #[serde(default)]
    pub interval_hours: u64,
}

/// Longest accepted gap between scheduled sweeps (one year)
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

impl RetentionConfig {
    /// Period between scheduled sweeps; `None` when scheduling is off
    /// or the period cannot be represented
    pub fn interval(&self) -> Option<Duration> {
        if self.interval_hours == 0 {
            return None;
        }
        self.interval_hours.checked_mul(3600).map(Duration::from_secs)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: default_days_to_keep(),
            interval_hours: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_inventory_path")]
    pub path: PathBuf,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: default_inventory_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_binary")]
    pub binary: String,
    /// Login user; ssh's own default when unset
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Passed through as `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    #[serde(default)]
    pub extra_options: Vec<String>,
    #[serde(default = "default_control_dir")]
    pub control_dir: PathBuf,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: default_ssh_binary(),
            user: None,
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            extra_options: Vec::new(),
            control_dir: default_control_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivedataConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl LivedataConfig {
    /// System config path: /etc/livedata/config.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/livedata/config.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. `$LIVEDATA_CONFIG` (must exist)
    /// 2. System config (/etc/livedata/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        warn!(
            "No config file at {}, using defaults",
            system_path.display()
        );
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LivedataError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
            .map_err(|e| LivedataError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LivedataConfig =
            toml::from_str(contents).map_err(|e| LivedataError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.workers == 0 {
            return Err(LivedataError::Config("jobs.workers must be at least 1".to_string()));
        }
        if self.jobs.queue_depth == 0 {
            return Err(LivedataError::Config("jobs.queue_depth must be at least 1".to_string()));
        }
        if self.jobs.query_soft_time_limit == 0 {
            return Err(LivedataError::Config(
                "jobs.query_soft_time_limit must be at least 1 second".to_string(),
            ));
        }
        if self.jobs.cleanup_soft_time_limit == 0 {
            return Err(LivedataError::Config(
                "jobs.cleanup_soft_time_limit must be at least 1 second".to_string(),
            ));
        }
        if self.retention.interval_hours > MAX_INTERVAL_HOURS {
            return Err(LivedataError::Config(format!(
                "retention.interval_hours must be at most {}",
                MAX_INTERVAL_HOURS
            )));
        }
        if self.retention.days_to_keep < 1 {
            return Err(LivedataError::Config(
                "retention.days_to_keep must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Job types managed by the service, query job first
    pub fn job_names(&self) -> [&str; 2] {
        [self.jobs.query_job_name.as_str(), self.jobs.cleanup_job_name.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = LivedataConfig::default();
        assert_eq!(config.jobs.query_job_name, "Livedata Query Interface Job");
        assert_eq!(config.jobs.cleanup_job_name, "Livedata Cleanup job results");
        assert_eq!(config.jobs.query_time_limit(), Duration::from_secs(60));
        assert_eq!(config.retention.days_to_keep, 30);
        assert_eq!(config.retention.interval_hours, 0);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let config = LivedataConfig::from_toml_str("").unwrap();
        assert_eq!(config, LivedataConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let config = LivedataConfig::from_toml_str(
            r#"
log_level = "debug"

[jobs]
query_soft_time_limit = 120

[ssh]
user = "netops"
extra_options = ["StrictHostKeyChecking=accept-new"]
"#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.jobs.query_soft_time_limit, 120);
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.ssh.user.as_deref(), Some("netops"));
        assert_eq!(config.ssh.port, 22);
    }

    #[test]
    fn test_invalid_values() {
        let err = LivedataConfig::from_toml_str("[jobs]\nworkers = 0").unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(LivedataConfig::from_toml_str("[retention]\ndays_to_keep = 0").is_err());
        assert!(LivedataConfig::from_toml_str("[server]\nlisten = 5").is_err());
    }

    #[test]
    fn test_zero_time_limits_rejected() {
        let err = LivedataConfig::from_toml_str("[jobs]\nquery_soft_time_limit = 0").unwrap_err();
        assert!(err.to_string().contains("query_soft_time_limit"));
        assert!(LivedataConfig::from_toml_str("[jobs]\ncleanup_soft_time_limit = 0").is_err());
        assert!(LivedataConfig::from_toml_str("[jobs]\nquery_soft_time_limit = 1").is_ok());
    }

    #[test]
    fn test_retention_interval() {
        let config = LivedataConfig::from_toml_str("[retention]\ninterval_hours = 24").unwrap();
        assert_eq!(config.retention.interval(), Some(Duration::from_secs(86_400)));
        assert_eq!(RetentionConfig::default().interval(), None);

        let huge = format!("[retention]\ninterval_hours = {}", u64::MAX / 2);
        assert!(LivedataConfig::from_toml_str(&huge).is_err());
        let overflowing = RetentionConfig {
            days_to_keep: 30,
            interval_hours: u64::MAX,
        };
        assert_eq!(overflowing.interval(), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten = \"0.0.0.0:9000\"").unwrap();
        let config = LivedataConfig::load_from(file.path()).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
    }
}
