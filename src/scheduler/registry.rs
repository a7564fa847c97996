//! Canonical in-memory task map and its persistence

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ledger::{self, LedgerError, PersistenceStore, snapshot};
use crate::observability::Metrics;
use crate::task::{
    Task, TaskDefaults, TaskLimits, TaskSpec, TaskStatus, ValidationError, validate_spec,
};

/// Shared handle to one task record; all chapter mutation happens under this lock
pub type TaskHandle = Arc<Mutex<Task>>;

/// Dashboard-style list filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    /// Completed tasks
    Downloaded,
    Downloading,
    Failed,
    /// Pending or paused
    Pending,
}

impl StatusFilter {
    pub fn matches(self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Downloaded => status == TaskStatus::Completed,
            StatusFilter::Downloading => status == TaskStatus::Downloading,
            StatusFilter::Failed => status == TaskStatus::Failed,
            StatusFilter::Pending => matches!(status, TaskStatus::Pending | TaskStatus::Paused),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub downloading: usize,
    pub failed: usize,
    /// Pending plus paused
    pub pending: usize,
}

pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskHandle>>,
    store: Arc<dyn PersistenceStore>,
    dirty: AtomicBool,
    defaults: TaskDefaults,
    limits: TaskLimits,
    metrics: Arc<Metrics>,
}

impl TaskRegistry {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        defaults: TaskDefaults,
        limits: TaskLimits,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            store,
            dirty: AtomicBool::new(false),
            defaults,
            limits,
            metrics,
        }
    }

    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task, ValidationError> {
        validate_spec(&spec, &self.limits)?;

        let id = format!("task_{}", Uuid::now_v7().simple());
        let task = Task::from_spec(id.clone(), spec, &self.defaults);
        let snapshot = task.clone();

        self.tasks
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(task)));
        info!(
            task_id = %id,
            title = %snapshot.title,
            chapters = snapshot.total_chapters(),
            "Task created"
        );

        self.persist_now().await;
        Ok(snapshot)
    }

    pub async fn handle(&self, id: &str) -> Option<TaskHandle> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        let handle = self.handle(id).await?;
        let task = handle.lock().await;
        Some(task.clone())
    }

    /// All tasks, newest first
    pub async fn list_tasks(&self) -> Vec<Task> {
        let handles: Vec<TaskHandle> = self.tasks.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            tasks.push(handle.lock().await.clone());
        }
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tasks
    }

    pub async fn list_by_status(&self, filter: StatusFilter) -> Vec<Task> {
        let mut tasks = self.list_tasks().await;
        tasks.retain(|task| filter.matches(task.status));
        tasks
    }

    pub async fn stats(&self) -> TaskStats {
        let handles: Vec<TaskHandle> = self.tasks.read().await.values().cloned().collect();

        let mut stats = TaskStats {
            total: handles.len(),
            ..TaskStats::default()
        };
        for handle in handles {
            match handle.lock().await.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Downloading => stats.downloading += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Pending | TaskStatus::Paused => stats.pending += 1,
            }
        }
        stats
    }

    /// Drop the record. The caller is responsible for stopping any run first.
    pub async fn remove(&self, id: &str) -> Option<TaskHandle> {
        let removed = self.tasks.write().await.remove(id);
        if removed.is_some() {
            info!(task_id = id, "Task deleted");
            self.persist_now().await;
        }
        removed
    }

    /// Delete every completed task, returning their ids
    pub async fn clear_completed(&self) -> Vec<String> {
        let handles: Vec<(String, TaskHandle)> = self
            .tasks
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let mut completed = Vec::new();
        for (id, handle) in handles {
            if handle.lock().await.status == TaskStatus::Completed {
                completed.push(id);
            }
        }

        if !completed.is_empty() {
            let mut tasks = self.tasks.write().await;
            for id in &completed {
                tasks.remove(id);
            }
            drop(tasks);

            info!(count = completed.len(), "Completed tasks cleared");
            self.persist_now().await;
        }
        completed
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Serialise the whole map into one blob
    pub async fn snapshot(&self) -> ledger::Result<Vec<u8>> {
        let handles: Vec<TaskHandle> = self.tasks.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            tasks.push(handle.lock().await.clone());
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot::encode(&tasks)
    }

    /// Replace the map with the persisted one, normalising in-flight state
    pub async fn restore(&self) -> ledger::Result<usize> {
        let store = self.store.clone();
        let blob = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| LedgerError::Io(std::io::Error::other(e)))??;

        let Some(blob) = blob else {
            info!("No persisted task map, starting empty");
            return Ok(0);
        };

        let restored = snapshot::decode(&blob)?;
        let count = restored.len();

        let mut tasks = self.tasks.write().await;
        tasks.clear();
        for task in restored {
            tasks.insert(task.id.clone(), Arc::new(Mutex::new(task)));
        }
        drop(tasks);

        // Recovery may have changed statuses; write the normalised map back
        self.mark_dirty();
        info!(tasks = count, "Task map restored");
        Ok(count)
    }

    /// Save the map if anything changed since the last successful save.
    ///
    /// Returns whether a save happened. A failed save keeps the registry dirty
    /// so the next flush retries; in-memory state is never rolled back.
    pub async fn flush(&self) -> ledger::Result<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        match self.save().await {
            Ok(size) => {
                self.metrics.snapshot_flushed();
                debug!(size, "Task map flushed");
                Ok(true)
            }
            Err(e) => {
                self.mark_dirty();
                self.metrics.flush_failed();
                warn!(error = %e, "Task map flush failed");
                Err(e)
            }
        }
    }

    /// Flush right away after a significant transition; failures are logged only
    pub async fn persist_now(&self) {
        self.mark_dirty();
        let _ = self.flush().await;
    }

    async fn save(&self) -> ledger::Result<usize> {
        let blob = self.snapshot().await?;
        let size = blob.len();
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || store.save(&blob))
            .await
            .map_err(|e| LedgerError::Io(std::io::Error::other(e)))??;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryStore;
    use crate::task::ChapterSpec;

    fn registry_with(store: Arc<MemoryStore>) -> TaskRegistry {
        let limits = TaskLimits {
            max_chapters: 100,
            max_concurrency: 8,
        };
        TaskRegistry::new(store, TaskDefaults::default(), limits, Arc::new(Metrics::new()))
    }

    fn spec(title: &str) -> TaskSpec {
        TaskSpec::builder()
            .title(title)
            .chapters(vec![ChapterSpec::new("One", "/1"), ChapterSpec::new("Two", "/2")])
            .build()
    }

    #[tokio::test]
    async fn test_create_persists_immediately() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_with(store.clone());

        let task = registry.create_task(spec("Book")).await.unwrap();
        assert!(task.id.starts_with("task_"));
        assert_eq!(store.save_count(), 1);
        assert!(!registry.is_dirty());
        assert_eq!(registry.get_task(&task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_spec() {
        let registry = registry_with(Arc::new(MemoryStore::new()));
        let result = registry.create_task(TaskSpec::builder().title(" ").build()).await;
        assert_eq!(result.unwrap_err(), ValidationError::EmptyTitle);
        assert!(registry.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_filters() {
        let registry = registry_with(Arc::new(MemoryStore::new()));
        let first = registry.create_task(spec("First")).await.unwrap();
        let second = registry.create_task(spec("Second")).await.unwrap();

        {
            let handle = registry.handle(&first.id).await.unwrap();
            let mut task = handle.lock().await;
            task.status = TaskStatus::Completed;
        }

        let ids: Vec<String> = registry.list_tasks().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        let downloaded = registry.list_by_status(StatusFilter::Downloaded).await;
        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].id, first.id);

        let stats = registry.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);

        assert_eq!(registry.clear_completed().await, vec![first.id]);
        assert_eq!(registry.list_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_only_when_dirty() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_with(store.clone());
        registry.create_task(spec("Book")).await.unwrap();

        assert!(!registry.flush().await.unwrap());
        registry.mark_dirty();
        assert!(registry.flush().await.unwrap());
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_flush_stays_dirty() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_with(store.clone());
        let task = registry.create_task(spec("Book")).await.unwrap();

        store.set_failing(true);
        registry.mark_dirty();
        assert!(registry.flush().await.is_err());
        assert!(registry.is_dirty());
        assert!(registry.get_task(&task.id).await.is_some());

        store.set_failing(false);
        assert!(registry.flush().await.unwrap());
        assert!(!registry.is_dirty());
    }

    #[tokio::test]
    async fn test_restore_round_trip_normalises() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_with(store.clone());
        let task = registry.create_task(spec("Book")).await.unwrap();
        {
            let handle = registry.handle(&task.id).await.unwrap();
            let mut task = handle.lock().await;
            task.status = TaskStatus::Downloading;
            task.claim_next();
        }
        registry.persist_now().await;

        let reloaded = registry_with(store);
        assert_eq!(reloaded.restore().await.unwrap(), 1);
        let restored = reloaded.get_task(&task.id).await.unwrap();
        assert_eq!(restored.status, TaskStatus::Paused);
        assert_eq!(restored.progress.downloading_count, 0);
        assert_eq!(restored.progress.pending_count, 2);
    }

    #[tokio::test]
    async fn test_restore_empty_store() {
        let registry = registry_with(Arc::new(MemoryStore::new()));
        assert_eq!(registry.restore().await.unwrap(), 0);
    }
}
