//! HTTP content fetcher

use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::traits::{ContentFetcher, FetchError, Result};
use crate::task::AuthContext;

/// Prefix of the inline chapter payloads some sources return instead of plain text
pub const NOVEL_SCHEME: &str = "novel://";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!("novelbox/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy_url: None,
        }
    }
}

/// Fetches chapters over HTTP(S).
///
/// A single call makes a single request; retrying is left to the scheduler.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = &config.proxy_url {
            let proxy = Proxy::all(url)
                .map_err(|e| FetchError::InvalidReference(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(
        &self,
        source_ref: &str,
        chapter_ref: &str,
        auth: &AuthContext,
    ) -> Result<String> {
        let url = resolve_chapter_url(source_ref, chapter_ref)?;
        debug!(%url, "Fetching chapter");

        let mut request = self.client.get(url.clone());
        for (name, value) in &auth.headers {
            request = request.header(name, value);
        }
        if !auth.params.is_empty() {
            request = request.query(&auth.params);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::RequestFailed(format!("failed to read body: {}", e)))?;

        let content = decode_chapter_body(&body)?;
        debug!(%url, size = content.len(), "Chapter fetched");
        Ok(content)
    }
}

/// Resolve a chapter reference against the task's source reference.
///
/// Absolute URLs are used as-is, `/path` references are joined to the source
/// origin, anything else is appended to the source reference.
pub fn resolve_chapter_url(source_ref: &str, chapter_ref: &str) -> Result<Url> {
    let chapter_ref = chapter_ref.trim();
    let invalid = |e: <Url as std::str::FromStr>::Err| {
        FetchError::InvalidReference(format!("{} ({})", chapter_ref, e))
    };

    if chapter_ref.starts_with("http://") || chapter_ref.starts_with("https://") {
        return Url::parse(chapter_ref).map_err(invalid);
    }

    let base = Url::parse(source_ref.trim()).map_err(invalid)?;
    if chapter_ref.starts_with('/') {
        return base.join(chapter_ref).map_err(invalid);
    }

    Url::parse(&format!(
        "{}/{}",
        source_ref.trim().trim_end_matches('/'),
        chapter_ref
    ))
    .map_err(invalid)
}

/// Extract chapter text from a response body.
///
/// Understands `novel://{json}` payloads (bare or wrapped in a `{"url": ...}`
/// object), JSON objects carrying `content` or `text`, and plain text.
pub fn decode_chapter_body(body: &str) -> Result<String> {
    let trimmed = body.trim_start();

    if let Some(payload) = trimmed.strip_prefix(NOVEL_SCHEME) {
        return decode_novel_payload(payload);
    }

    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(payload) = map
                .get("url")
                .and_then(Value::as_str)
                .and_then(|url| url.strip_prefix(NOVEL_SCHEME))
            {
                return decode_novel_payload(payload);
            }

            return ["content", "text"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_owned)
                .ok_or_else(|| {
                    FetchError::InvalidPayload("JSON body has no chapter content".to_string())
                });
        }
    }

    Ok(body.to_string())
}

fn decode_novel_payload(payload: &str) -> Result<String> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| FetchError::InvalidPayload(format!("bad {} payload: {}", NOVEL_SCHEME, e)))?;

    match value {
        Value::Object(map) => Ok(map
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()),
        Value::String(text) => Ok(text),
        other => Err(FetchError::InvalidPayload(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
