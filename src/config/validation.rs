use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("scheduler.default_concurrency ({default}) exceeds scheduler.max_concurrency ({max})")]
    ConcurrencyAboveMax { default: usize, max: usize },

    #[error("fetcher.user_agent must not be empty")]
    EmptyUserAgent,

    #[error("fetcher.proxy_url is not a valid URL: {0}")]
    InvalidProxyUrl(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_api(config)?;
    validate_scheduler(config)?;
    validate_fetcher(config)?;
    Ok(())
}

fn non_zero(value: u64, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::Zero { field });
    }
    Ok(())
}

fn validate_api(config: &Config) -> Result<(), ValidationError> {
    non_zero(config.api.max_payload_bytes.as_u64(), "api.max_payload_bytes")?;
    non_zero(config.api.max_chapters_per_task as u64, "api.max_chapters_per_task")?;
    non_zero(config.api.max_in_flight as u64, "api.max_in_flight")
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    let scheduler = &config.scheduler;
    non_zero(scheduler.default_concurrency as u64, "scheduler.default_concurrency")?;
    if scheduler.default_concurrency > scheduler.max_concurrency {
        return Err(ValidationError::ConcurrencyAboveMax {
            default: scheduler.default_concurrency,
            max: scheduler.max_concurrency,
        });
    }
    non_zero(scheduler.flush_interval_ms, "scheduler.flush_interval_ms")?;
    non_zero(scheduler.event_buffer as u64, "scheduler.event_buffer")
}

fn validate_fetcher(config: &Config) -> Result<(), ValidationError> {
    let fetcher = &config.fetcher;
    non_zero(fetcher.connect_timeout_secs, "fetcher.connect_timeout_secs")?;
    non_zero(fetcher.request_timeout_secs, "fetcher.request_timeout_secs")?;

    if fetcher.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    if let Some(proxy) = &fetcher.proxy_url {
        reqwest::Url::parse(proxy).map_err(|e| ValidationError::InvalidProxyUrl(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.scheduler.default_concurrency = 0;
        assert_eq!(
            validate(&config),
            Err(ValidationError::Zero {
                field: "scheduler.default_concurrency"
            })
        );
    }

    #[test]
    fn test_default_concurrency_above_max_rejected() {
        let mut config = Config::default();
        config.scheduler.default_concurrency = 32;
        config.scheduler.max_concurrency = 16;
        assert_eq!(
            validate(&config),
            Err(ValidationError::ConcurrencyAboveMax {
                default: 32,
                max: 16
            })
        );
    }

    #[test]
    fn test_zero_payload_limit_rejected() {
        let mut config = Config::default();
        config.api.max_payload_bytes = ByteSize(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::Zero { field: "api.max_payload_bytes" })
        ));
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let mut config = Config::default();
        config.scheduler.flush_interval_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_proxy_rejected() {
        let mut config = Config::default();
        config.fetcher.proxy_url = Some("not a url".into());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidProxyUrl(_))
        ));
    }
}
