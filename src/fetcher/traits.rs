use async_trait::async_trait;
use thiserror::Error;

use crate::task::AuthContext;

/// Chapter fetch errors.
///
/// The scheduler treats every variant as retryable; the distinction only
/// matters for logs and `last_error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("connection timeout")]
    Timeout,
    #[error("invalid chapter reference: {0}")]
    InvalidReference(String),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("unrecognised chapter payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Retrieves the text of one chapter.
///
/// Implementations must be safe to call concurrently with different chapter
/// references.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(
        &self,
        source_ref: &str,
        chapter_ref: &str,
        auth: &AuthContext,
    ) -> Result<String>;
}
