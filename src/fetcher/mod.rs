//! Chapter content retrieval
//!
//! The scheduler only sees the [`ContentFetcher`] trait. [`HttpFetcher`] is the
//! implementation used by the binary; tests substitute their own.

pub mod http;
mod traits;

pub use http::{HttpConfig, HttpFetcher};
pub use traits::{ContentFetcher, FetchError, Result};
