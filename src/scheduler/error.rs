use thiserror::Error;

use crate::export::ExportError;
use crate::ledger::LedgerError;
use crate::task::{ChapterStatus, ValidationError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid task: {0}")]
    Validation(#[from] ValidationError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {task_id} has no chapter {index}")]
    ChapterNotFound { task_id: String, index: usize },

    #[error("Chapter {index} of task {task_id} is {status}, only failed chapters can be retried")]
    RetryRejected {
        task_id: String,
        index: usize,
        status: ChapterStatus,
    },

    #[error("Persistence error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
