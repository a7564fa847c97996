//! Configuration management for novelbox
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `.env` file
//! 4. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use novelbox::config::Config;
//!
//! let config = Config::load()?;
//! println!("Server listening on: {}", config.server.bind_addr);
//! # Ok::<(), novelbox::config::ConfigError>(())
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `NOVELBOX__<section>__<key>`:
//! - `NOVELBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `NOVELBOX__SCHEDULER__DEFAULT_CONCURRENCY=5`
//! - `NOVELBOX__API__MAX_PAYLOAD_BYTES=2MB`
//!
//! # Configuration File
//!
//! By default the file is `config/novelbox.toml`; `NOVELBOX_CONFIG` points
//! elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{ApiLimits, Config, FetcherConfig, SchedulerConfig, ServerConfig};
pub use validation::ValidationError;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Config {
    /// Load from the default file location (or `$NOVELBOX_CONFIG`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&sources::config_path())
    }

    /// Load with an explicit TOML path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("novelbox.toml");
        fs::write(
            &path,
            r#"
[server]
bind_addr = "127.0.0.1:7000"
export_path = "out"

[scheduler]
default_concurrency = 2
default_max_retries = 5
retry_delay_ms = 100
flush_interval_ms = 250

[fetcher]
request_timeout_secs = 15
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        let defaults = crate::task::TaskDefaults::from(&config.scheduler);

        assert_eq!(defaults.concurrency, 2);
        assert_eq!(defaults.max_retries, 5);
        assert_eq!(defaults.retry_delay.as_millis(), 100);
        assert_eq!(config.scheduler.flush_interval().as_millis(), 250);

        let http = crate::fetcher::HttpConfig::from(&config.fetcher);
        assert_eq!(http.request_timeout.as_secs(), 15);
        assert_eq!(http.connect_timeout.as_secs(), 10);
    }

    #[test]
    fn test_validation_runs_after_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("novelbox.toml");
        fs::write(&path, "[scheduler]\nevent_buffer = 0\n").unwrap();

        let result = Config::load_from_path(&path);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::Zero {
                field: "scheduler.event_buffer"
            }))
        ));
    }
}
