//! Wire types of the HTTP control API.
//!
//! Requests reuse the domain types directly (`TaskSpec` for `POST /tasks`,
//! `ExportOptions` for `POST /tasks/{id}/export`). Responses never carry
//! chapter content; it is only reachable through an export.
//!
//! ```json
//! {
//!   "title": "The Long Road",
//!   "source_ref": "https://example.com/book/1",
//!   "author": "A. Writer",
//!   "chapters": [
//!     { "name": "Chapter 1", "source_ref": "/book/1/1.html" },
//!     { "name": "Chapter 2", "source_ref": "/book/1/2.html" }
//!   ],
//!   "concurrency": 2,
//!   "auth": { "headers": { "Cookie": "session=abc" } }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::scheduler::StatusFilter;
use crate::task::{Chapter, ChapterStatus, Progress, Task, TaskSettings, TaskStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: StatusFilter,
}

/// List entry, without chapters
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub status: TaskStatus,
    pub total_chapters: usize,
    #[serde(flatten)]
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            author: task.author.clone(),
            status: task.status,
            total_chapters: task.total_chapters(),
            progress: task.progress,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChapterView {
    pub index: usize,
    pub name: String,
    pub status: ChapterStatus,
    pub size: u64,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl From<&Chapter> for ChapterView {
    fn from(chapter: &Chapter) -> Self {
        Self {
            index: chapter.index,
            name: chapter.name.clone(),
            status: chapter.status,
            size: chapter.size,
            attempt_count: chapter.attempt_count,
            last_error: chapter.last_error.clone(),
        }
    }
}

/// Full task view
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub source_ref: String,
    pub settings: TaskSettings,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub chapters: Vec<ChapterView>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            summary: TaskSummary::from(task),
            source_ref: task.source_ref.clone(),
            settings: task.settings.clone(),
            started_at: task.started_at,
            completed_at: task.completed_at,
            chapters: task.chapters.iter().map(ChapterView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearCompletedResponse {
    pub removed: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_task: Option<String>,
    pub queued_tasks: Vec<String>,
    pub metrics: MetricsSnapshot,
}
