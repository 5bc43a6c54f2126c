//! Service configuration, loaded once at startup from a YAML file.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Runtime configuration for the service.
///
/// The file is read once during startup; every field is read-only for the
/// rest of the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Process heap threshold, in megabytes, above which the memory
    /// watchdog trips.
    pub max_memory_mb: u64,
    /// Upper bound on accepted script source length, in bytes.
    pub max_script_size: usize,
    /// Port the external listener binds on.
    pub server_port: u16,
    /// Per-evaluation deadline.
    #[serde(with = "humantime_serde")]
    pub script_timeout: Duration,
    /// Fixed worker count; also the job-queue capacity.
    pub worker_pool_size: usize,
    /// Duplicate logs to standard output in addition to the log file.
    #[serde(default)]
    pub log_on_console: bool,
    /// Soft deadline for draining in-flight requests during graceful
    /// shutdown.
    #[serde(rename = "shutdown_allow_time", with = "humantime_serde")]
    pub shutdown_time_limit: Duration,
    /// Post-drain pause before the process exits.
    #[serde(rename = "shutdown_pause_time", with = "humantime_serde")]
    pub shutdown_pause: Duration,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_memory_mb < 1 {
            bail!("invalid memory limit: {} MB, minimum is 1", self.max_memory_mb);
        }
        if self.max_script_size < 2 {
            bail!(
                "invalid script size limit: {} bytes, minimum is 2",
                self.max_script_size
            );
        }
        Ok(())
    }

    /// Watchdog threshold in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.max_memory_mb << 20
    }
}
