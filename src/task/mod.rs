//! Task domain: records, derived progress, retry decisions and spec validation.
//!
//! Everything in here is synchronous and free of I/O; the scheduler owns the
//! concurrency around it.

pub mod models;
pub mod progress;
pub mod retry;
pub mod validation;

pub use models::{
    AuthContext, Chapter, ChapterSpec, ChapterStatus, HeadersMap, Task, TaskDefaults,
    TaskSettings, TaskSpec, TaskStatus,
};
pub use progress::{Progress, aggregate};
pub use retry::{RetryDecision, RetryPolicy};
pub use validation::{TaskLimits, ValidationError, validate_spec};
