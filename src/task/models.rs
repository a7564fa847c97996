//! Task and chapter records.
//!
//! A [`Task`] is one novel being downloaded; its [`Chapter`]s are the
//! independently fetchable units. Task-level counters live in [`Progress`] and
//! are only ever written by [`Task::recompute_progress`].

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::progress::{Progress, aggregate};

pub type HeadersMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl ChapterStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChapterStatus::Completed | ChapterStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Downloading => "downloading",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Opaque request context forwarded to the content fetcher with every chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Extra HTTP headers (cookies, referer, tokens)
    #[serde(default)]
    pub headers: HeadersMap,
    /// Site-specific parameters (module, flag, api url, ...)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Per-task download settings, resolved at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
    #[serde(rename = "chapter_interval_ms", with = "duration_ms")]
    pub chapter_interval: Duration,
    pub file_name: String,
}

/// Fallback values for settings a [`TaskSpec`] leaves out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefaults {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub chapter_interval: Duration,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            chapter_interval: Duration::ZERO,
        }
    }
}

/// One chapter as submitted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSpec {
    #[serde(default)]
    pub name: String,
    pub source_ref: String,
}

impl ChapterSpec {
    pub fn new(name: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_ref: source_ref.into(),
        }
    }
}

/// Caller-supplied description of a new download task
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct TaskSpec {
    #[builder(into)]
    pub title: String,
    #[serde(default)]
    #[builder(into, default)]
    pub source_ref: String,
    #[builder(into)]
    pub author: Option<String>,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub cover: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub metadata: Value,
    #[serde(default)]
    #[builder(default)]
    pub chapters: Vec<ChapterSpec>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub chapter_interval_ms: Option<u64>,
    #[builder(into)]
    pub file_name: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub auth: AuthContext,
}

impl TaskSpec {
    /// Fill unset settings from `defaults`
    pub fn resolve_settings(&self, defaults: &TaskDefaults) -> TaskSettings {
        let file_name = self
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.title.trim())
            .to_string();

        TaskSettings {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            chapter_interval: self
                .chapter_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.chapter_interval),
            file_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: usize,
    pub name: String,
    pub source_ref: String,
    pub status: ChapterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Chapter {
    pub fn new(index: usize, spec: &ChapterSpec) -> Self {
        let name = match spec.name.trim() {
            "" => format!("Chapter {}", index + 1),
            name => name.to_string(),
        };

        Self {
            index,
            name,
            source_ref: spec.source_ref.clone(),
            status: ChapterStatus::Pending,
            content: None,
            size: 0,
            attempt_count: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// pending -> downloading. Returns false if the chapter was not pending.
    pub fn claim(&mut self) -> bool {
        if self.status != ChapterStatus::Pending {
            return false;
        }
        self.status = ChapterStatus::Downloading;
        self.started_at = Some(Utc::now());
        true
    }

    pub fn complete(&mut self, content: String) {
        self.size = content.len() as u64;
        self.content = Some(content);
        self.status = ChapterStatus::Completed;
        self.last_error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: String) {
        self.status = ChapterStatus::Failed;
        self.last_error = Some(reason);
    }

    /// Put an interrupted or retryable chapter back into the claim pool
    pub fn release(&mut self) {
        self.status = ChapterStatus::Pending;
        self.started_at = None;
    }

    /// Back to a fresh pending state, forgetting attempts and errors
    pub fn reset(&mut self) {
        self.release();
        self.attempt_count = 0;
        self.last_error = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub source_ref: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub settings: TaskSettings,
    #[serde(default)]
    pub auth: AuthContext,
    pub status: TaskStatus,
    pub chapters: Vec<Chapter>,
    #[serde(flatten)]
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped whenever an active run is interrupted; results from older runs are dropped
    #[serde(skip)]
    pub(crate) run_epoch: u64,
}

impl Task {
    pub fn from_spec(id: String, spec: TaskSpec, defaults: &TaskDefaults) -> Self {
        let settings = spec.resolve_settings(defaults);
        let chapters: Vec<Chapter> = spec
            .chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| Chapter::new(index, chapter))
            .collect();
        let now = Utc::now();

        let mut task = Self {
            id,
            title: spec.title.trim().to_string(),
            source_ref: spec.source_ref,
            author: spec.author,
            description: spec.description,
            cover: spec.cover,
            metadata: spec.metadata,
            settings,
            auth: spec.auth,
            status: TaskStatus::Pending,
            chapters,
            progress: Progress::default(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            run_epoch: 0,
        };
        task.recompute_progress();
        task
    }

    pub fn total_chapters(&self) -> usize {
        self.chapters.len()
    }

    pub fn recompute_progress(&mut self) {
        self.progress = aggregate(&self.chapters);
        self.updated_at = Utc::now();
    }

    /// Claim the lowest-index pending chapter
    pub fn claim_next(&mut self) -> Option<usize> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|chapter| chapter.status == ChapterStatus::Pending)?;
        chapter.claim();
        let index = chapter.index;
        self.recompute_progress();
        Some(index)
    }

    pub fn pending_chapters(&self) -> usize {
        self.chapters
            .iter()
            .filter(|chapter| chapter.status == ChapterStatus::Pending)
            .count()
    }

    pub fn has_unfinished(&self) -> bool {
        self.chapters.iter().any(|chapter| !chapter.status.is_terminal())
    }

    /// Release every in-flight chapter back to pending
    pub fn release_in_flight(&mut self) -> usize {
        let mut released = 0;
        for chapter in &mut self.chapters {
            if chapter.status == ChapterStatus::Downloading {
                chapter.release();
                released += 1;
            }
        }
        released
    }

    /// Decide the status of a task whose run has ended.
    ///
    /// Completed if every chapter completed, failed if nothing is left to do
    /// and something failed, paused otherwise.
    pub fn settle(&mut self) -> TaskStatus {
        self.recompute_progress();
        let total = self.total_chapters();

        self.status = if self.progress.completed_count == total {
            // A re-settled task keeps its first completion time
            self.completed_at.get_or_insert_with(Utc::now);
            TaskStatus::Completed
        } else if !self.has_unfinished() && self.progress.failed_count > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Paused
        };
        if self.status != TaskStatus::Completed {
            self.completed_at = None;
        }
        self.status
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(chapters: usize) -> TaskSpec {
        TaskSpec::builder()
            .title("  The Long Road ")
            .source_ref("https://example.com/book/1")
            .chapters(
                (0..chapters)
                    .map(|i| ChapterSpec::new("", format!("/chapter/{i}")))
                    .collect(),
            )
            .build()
    }

    #[test]
    fn test_from_spec_initialises_pending_chapters() {
        let task = Task::from_spec("task_1".into(), spec(3), &TaskDefaults::default());

        assert_eq!(task.title, "The Long Road");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.settings.file_name, "The Long Road");
        assert_eq!(task.settings.concurrency, 3);
        assert_eq!(task.chapters[2].name, "Chapter 3");
        assert!(task
            .chapters
            .iter()
            .all(|chapter| chapter.status == ChapterStatus::Pending));
        assert_eq!(task.progress.pending_count, 3);
    }

    #[test]
    fn test_spec_settings_override_defaults() {
        let mut spec = spec(1);
        spec.concurrency = Some(7);
        spec.retry_delay_ms = Some(10);
        spec.file_name = Some("road".into());

        let settings = spec.resolve_settings(&TaskDefaults::default());
        assert_eq!(settings.concurrency, 7);
        assert_eq!(settings.retry_delay, Duration::from_millis(10));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.file_name, "road");
    }

    #[test]
    fn test_claim_next_follows_index_order() {
        let mut task = Task::from_spec("task_1".into(), spec(3), &TaskDefaults::default());

        assert_eq!(task.claim_next(), Some(0));
        assert_eq!(task.claim_next(), Some(1));
        task.chapters[0].complete("text".into());
        assert_eq!(task.claim_next(), Some(2));
        assert_eq!(task.claim_next(), None);
        assert_eq!(task.release_in_flight(), 2);
        assert_eq!(task.claim_next(), Some(1));
    }

    #[test]
    fn test_chapter_claim_is_exclusive() {
        let mut chapter = Chapter::new(0, &ChapterSpec::new("One", "/1"));
        assert!(chapter.claim());
        assert!(!chapter.claim());
    }

    #[test]
    fn test_settle_outcomes() {
        let defaults = TaskDefaults::default();

        let mut done = Task::from_spec("a".into(), spec(2), &defaults);
        for chapter in &mut done.chapters {
            chapter.complete("x".into());
        }
        assert_eq!(done.settle(), TaskStatus::Completed);
        assert!(done.completed_at.is_some());

        let mut mixed = Task::from_spec("b".into(), spec(2), &defaults);
        mixed.chapters[0].complete("x".into());
        mixed.chapters[1].fail("boom".into());
        assert_eq!(mixed.settle(), TaskStatus::Failed);

        let mut unfinished = Task::from_spec("c".into(), spec(2), &defaults);
        unfinished.chapters[1].fail("boom".into());
        assert_eq!(unfinished.settle(), TaskStatus::Paused);
        assert!(unfinished.completed_at.is_none());
    }

    #[test]
    fn test_settle_keeps_first_completion_time() {
        let mut task = Task::from_spec("a".into(), spec(1), &TaskDefaults::default());
        task.chapters[0].complete("x".into());
        task.settle();
        let first = task.completed_at;

        task.status = TaskStatus::Downloading;
        assert_eq!(task.settle(), TaskStatus::Completed);
        assert_eq!(task.completed_at, first);
    }

    #[test]
    fn test_pending_chapters_ignores_claimed_and_finished() {
        let mut task = Task::from_spec("a".into(), spec(3), &TaskDefaults::default());
        assert_eq!(task.pending_chapters(), 3);
        task.claim_next();
        task.chapters[2].complete("x".into());
        assert_eq!(task.pending_chapters(), 1);
    }

    #[test]
    fn test_serde_round_trip_keeps_settings_in_millis() {
        let task = Task::from_spec("task_1".into(), spec(1), &TaskDefaults::default());
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["settings"]["retry_delay_ms"], 2000);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["completed_count"], 0);

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.settings, task.settings);
        assert_eq!(back.chapters, task.chapters);
    }
}
