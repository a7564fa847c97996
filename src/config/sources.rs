use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "NOVELBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/novelbox.toml";
const ENV_PREFIX: &str = "NOVELBOX";
const ENV_SEPARATOR: &str = "__";

/// Path of the TOML file: `$NOVELBOX_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Layers, lowest priority first: struct defaults, TOML file, `.env`, process env
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    load_from_sources(path)
}

/// Same as [`load`] without touching `.env`
pub fn load_from_sources(path: &Path) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if path.exists() {
        tracing::info!("Loading configuration from: {}", path.display());
        builder = builder.add_source(File::from(path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            path.display()
        );
    }

    // NOVELBOX__SCHEDULER__DEFAULT_CONCURRENCY -> scheduler.default_concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_sources(&temp_dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.scheduler.default_concurrency, 3);
        assert_eq!(config.scheduler.max_concurrency, 16);
        assert_eq!(config.scheduler.retry_delay_ms, 2000);
        assert_eq!(config.api.max_payload_bytes.as_u64(), 5 * 1024 * 1024);
        assert!(config.fetcher.proxy_url.is_none());
    }

    #[test]
    fn test_toml_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("novelbox.toml");
        fs::write(
            &path,
            r#"
[server]
bind_addr = "127.0.0.1:9000"
ledger_path = "/tmp/ledger"

[api]
max_payload_bytes = "1MB"
max_chapters_per_task = 50

[scheduler]
default_concurrency = 8
max_concurrency = 12
chapter_interval_ms = 1000

[fetcher]
user_agent = "reader/1.0"
proxy_url = "http://proxy:3128"
            "#,
        )
        .unwrap();

        let config = load_from_sources(&path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.ledger_path, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.server.export_path, PathBuf::from("data/exports"));
        assert_eq!(config.api.max_payload_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.api.max_chapters_per_task, 50);
        assert_eq!(config.scheduler.default_concurrency, 8);
        assert_eq!(config.scheduler.max_concurrency, 12);
        assert_eq!(config.scheduler.default_max_retries, 3);
        assert_eq!(config.scheduler.chapter_interval_ms, 1000);
        assert_eq!(config.fetcher.user_agent, "reader/1.0");
        assert_eq!(config.fetcher.proxy_url.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[scheduler\ndefault_concurrency = ").unwrap();

        assert!(load_from_sources(&path).is_err());
    }
}
