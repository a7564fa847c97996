use crate::fetcher::HttpConfig;
use crate::humanize::ByteSize;
use crate::task::{TaskDefaults, TaskLimits};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiLimits,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Config {
    /// Bounds applied to every submitted task spec
    pub fn task_limits(&self) -> TaskLimits {
        TaskLimits {
            max_chapters: self.api.max_chapters_per_task,
            max_concurrency: self.scheduler.max_concurrency,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Fjall keyspace holding the task map
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Root directory for exported documents
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
            export_path: default_export_path(),
        }
    }
}

/// HTTP API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    #[serde(default = "default_max_chapters_per_task")]
    pub max_chapters_per_task: usize,
    /// Requests handled concurrently by the router
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_chapters_per_task: default_max_chapters_per_task(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Scheduler defaults and persistence cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    /// Largest per-task worker count a spec may ask for
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub chapter_interval_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Capacity of the task update broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl SchedulerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            max_concurrency: default_max_concurrency(),
            default_max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            chapter_interval_ms: 0,
            flush_interval_ms: default_flush_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl From<&SchedulerConfig> for TaskDefaults {
    fn from(config: &SchedulerConfig) -> Self {
        TaskDefaults {
            concurrency: config.default_concurrency,
            max_retries: config.default_max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            chapter_interval: Duration::from_millis(config.chapter_interval_ms),
        }
    }
}

/// HTTP fetcher settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub proxy_url: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            proxy_url: None,
        }
    }
}

impl From<&FetcherConfig> for HttpConfig {
    fn from(config: &FetcherConfig) -> Self {
        HttpConfig {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            proxy_url: config.proxy_url.clone(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_export_path() -> PathBuf {
    PathBuf::from("data/exports")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::mib(5)
}

fn default_max_chapters_per_task() -> usize {
    10_000
}

fn default_max_in_flight() -> usize {
    256
}

fn default_concurrency() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_event_buffer() -> usize {
    256
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("novelbox/", env!("CARGO_PKG_VERSION")).to_string()
}
