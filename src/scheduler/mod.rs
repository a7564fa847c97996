//! Download scheduler
//!
//! [`DownloadScheduler`] owns the task registry, the FIFO of started tasks and
//! the worker pool. Exactly one task spawns workers at a time; when it
//! finishes or is paused, the next started task is activated.
//!
//! ```rust,ignore
//! let scheduler = DownloadScheduler::new(&config, fetcher, store, sink);
//! scheduler.restore().await?;
//! let task = scheduler.create_task(spec).await?;
//! scheduler.start(&task.id).await?;
//! ```

mod error;
mod events;
mod pool;
mod queue;
mod registry;

pub use error::{Result, SchedulerError};
pub use events::{EventBus, TaskUpdate};
pub use pool::{ChapterWorkerPool, RunContext};
pub use queue::{ActiveRun, Admission, TaskQueue};
pub use registry::{StatusFilter, TaskHandle, TaskRegistry, TaskStats};

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::export::{ArtifactHandle, ExportOptions, ExportSink, Exporter, render};
use crate::fetcher::ContentFetcher;
use crate::ledger::PersistenceStore;
use crate::observability::{Metrics, MetricsSnapshot};
use crate::task::{ChapterStatus, Task, TaskDefaults, TaskSpec, TaskStatus};

#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<TaskRegistry>,
    queue: Mutex<TaskQueue>,
    pool: ChapterWorkerPool,
    exporter: Exporter,
    events: EventBus,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

/// How an interrupted task's chapters are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Pause,
    Cancel,
}

impl DownloadScheduler {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn PersistenceStore>,
        sink: Arc<dyn ExportSink>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let events = EventBus::new(config.scheduler.event_buffer);
        let registry = Arc::new(TaskRegistry::new(
            store,
            TaskDefaults::from(&config.scheduler),
            config.task_limits(),
            metrics.clone(),
        ));
        let pool = ChapterWorkerPool::new(fetcher, registry.clone(), events.clone(), metrics.clone());

        Self {
            inner: Arc::new(Inner {
                registry,
                queue: Mutex::new(TaskQueue::new()),
                pool,
                exporter: Exporter::new(sink),
                events,
                metrics,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Load the persisted task map. Nothing is started automatically.
    pub async fn restore(&self) -> Result<usize> {
        Ok(self.inner.registry.restore().await?)
    }

    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        let task = self.inner.registry.create_task(spec).await?;
        self.inner.events.publish(&task);
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.inner
            .registry
            .get_task(id)
            .await
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        self.inner.registry.list_tasks().await
    }

    pub async fn list_by_status(&self, filter: StatusFilter) -> Vec<Task> {
        self.inner.registry.list_by_status(filter).await
    }

    pub async fn stats(&self) -> TaskStats {
        self.inner.registry.stats().await
    }

    pub async fn clear_completed(&self) -> Vec<String> {
        self.inner.registry.clear_completed().await
    }

    /// Mark the task downloading and activate or queue it.
    ///
    /// A no-op for a task that is already downloading (active or queued).
    pub async fn start(&self, id: &str) -> Result<Task> {
        let handle = self.inner.handle(id).await?;

        let (snapshot, admission) = {
            let mut task = handle.lock().await;
            if task.status == TaskStatus::Downloading {
                return Ok(task.clone());
            }

            task.status = TaskStatus::Downloading;
            task.started_at.get_or_insert_with(Utc::now);
            task.recompute_progress();
            self.inner.events.publish(&task);

            let admission = self.inner.lock_queue().admit(id);
            (task.clone(), admission)
        };
        self.inner.registry.mark_dirty();

        match admission {
            Admission::Activated(run) => {
                info!(task_id = id, "Task started");
                self.inner.spawn_driver(run);
            }
            Admission::Queued(position) => {
                info!(task_id = id, position, "Task queued behind active task");
            }
            Admission::Present => {}
        }
        Ok(snapshot)
    }

    /// Same as [`start`](Self::start); kept for callers resuming a paused task
    pub async fn resume(&self, id: &str) -> Result<Task> {
        self.start(id).await
    }

    /// Stop claiming, put in-flight chapters back to pending and mark the task paused
    pub async fn pause(&self, id: &str) -> Result<Task> {
        self.interrupt(id, Interrupt::Pause).await
    }

    /// Like pause, and additionally reset every non-completed chapter
    pub async fn cancel(&self, id: &str) -> Result<Task> {
        self.interrupt(id, Interrupt::Cancel).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let handle = self.inner.handle(id).await?;

        let next = {
            let mut task = handle.lock().await;
            task.run_epoch += 1;
            let mut queue = self.inner.lock_queue();
            queue.withdraw(id).and_then(|_| queue.advance())
        };

        self.inner.registry.remove(id).await;
        if let Some(run) = next {
            self.inner.spawn_driver(run);
        }
        Ok(())
    }

    /// Reset one failed chapter to pending so it is fetched again.
    ///
    /// An active run picks it up; otherwise it waits for the next start.
    pub async fn retry_chapter(&self, id: &str, index: usize) -> Result<Task> {
        let handle = self.inner.handle(id).await?;
        let mut task = handle.lock().await;

        let status = task
            .chapters
            .get(index)
            .map(|chapter| chapter.status)
            .ok_or_else(|| SchedulerError::ChapterNotFound {
                task_id: id.to_string(),
                index,
            })?;
        if status != ChapterStatus::Failed {
            return Err(SchedulerError::RetryRejected {
                task_id: id.to_string(),
                index,
                status,
            });
        }

        task.chapters[index].reset();
        if task.status == TaskStatus::Failed {
            // Work remains, so the task is no longer terminal
            task.status = TaskStatus::Paused;
        }
        task.recompute_progress();
        self.inner.events.publish(&task);
        self.inner.registry.mark_dirty();

        info!(task_id = id, chapter = index, status = %task.status, "Chapter reset for retry");
        Ok(task.clone())
    }

    /// Render and write the task's document to the sink; task state is untouched
    pub async fn export(&self, id: &str, options: ExportOptions) -> Result<ArtifactHandle> {
        let task = self.get_task(id).await?;
        let handle = self.inner.exporter.export(&task, &options).await?;
        info!(task_id = id, key = %handle.key, "Task exported");
        Ok(handle)
    }

    /// Render the document without writing it
    pub async fn render(&self, id: &str, options: ExportOptions) -> Result<String> {
        let task = self.get_task(id).await?;
        Ok(render(&task, &options)?.body)
    }

    /// Save the task map if it changed since the last save
    pub async fn flush(&self) -> Result<bool> {
        Ok(self.inner.registry.flush().await?)
    }

    /// Periodic flush until [`shutdown`](Self::shutdown)
    pub fn spawn_flusher(&self, interval: Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        // Failures are logged and retried on the next tick
                        let _ = inner.registry.flush().await;
                    }
                }
            }
            debug!("Task map flusher stopped");
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskUpdate> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn active_task(&self) -> Option<String> {
        self.inner
            .lock_queue()
            .active()
            .map(|run| run.task_id.clone())
    }

    pub fn queued_tasks(&self) -> Vec<String> {
        self.inner.lock_queue().waiting()
    }

    /// Stop the active run and the flusher, then write a final snapshot.
    ///
    /// Tasks are left downloading in the snapshot; the next restore turns them
    /// into paused tasks.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown.cancel();
        if let Some(run) = self.inner.lock_queue().drain() {
            info!(task_id = %run.task_id, "Stopping active task for shutdown");
        }

        self.inner.registry.mark_dirty();
        self.flush().await?;
        Ok(())
    }

    async fn interrupt(&self, id: &str, mode: Interrupt) -> Result<Task> {
        let handle = self.inner.handle(id).await?;

        let (snapshot, next) = {
            let mut task = handle.lock().await;
            let next = {
                let mut queue = self.inner.lock_queue();
                queue.withdraw(id).and_then(|_| queue.advance())
            };

            task.run_epoch += 1;
            let released = task.release_in_flight();

            match mode {
                Interrupt::Pause => {
                    if task.status == TaskStatus::Downloading {
                        task.status = TaskStatus::Paused;
                    }
                }
                Interrupt::Cancel => {
                    for chapter in &mut task.chapters {
                        if chapter.status != ChapterStatus::Completed {
                            chapter.reset();
                        }
                    }
                    if task.status != TaskStatus::Completed {
                        task.status = TaskStatus::Pending;
                    }
                }
            }
            task.recompute_progress();
            self.inner.events.publish(&task);

            info!(task_id = id, ?mode, released, status = %task.status, "Task interrupted");
            (task.clone(), next)
        };

        self.inner.registry.persist_now().await;
        if let Some(run) = next {
            self.inner.spawn_driver(run);
        }
        Ok(snapshot)
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn handle(&self, id: &str) -> Result<TaskHandle> {
        self.registry
            .handle(id)
            .await
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    fn spawn_driver(self: &Arc<Self>, run: ActiveRun) {
        let inner = self.clone();
        tokio::spawn(async move {
            let mut run = run;
            while let Some(next) = inner.drive(run).await {
                run = next;
            }
        });
    }

    /// Run one activation to its end. Returns the next run to drive when this
    /// one finished normally and another task was waiting.
    async fn drive(&self, run: ActiveRun) -> Option<ActiveRun> {
        let Some(handle) = self.registry.handle(&run.task_id).await else {
            let mut queue = self.lock_queue();
            queue.finish(run.run_id);
            return queue.advance();
        };

        let (epoch, concurrency) = {
            let mut task = handle.lock().await;
            if run.cancel.is_cancelled() {
                return None;
            }
            if task.status != TaskStatus::Downloading {
                let mut queue = self.lock_queue();
                queue.finish(run.run_id);
                return queue.advance();
            }
            task.run_epoch += 1;
            (task.run_epoch, task.settings.concurrency)
        };

        info!(
            task_id = %run.task_id,
            run_id = run.run_id,
            concurrency,
            "Spawning chapter workers"
        );
        let context = RunContext {
            task_id: run.task_id.clone(),
            handle: handle.clone(),
            epoch,
            cancel: run.cancel.clone(),
        };

        loop {
            let workers = self.pool.run(&context, concurrency).await;
            debug!(task_id = %run.task_id, workers, "Chapter workers drained");

            let mut task = handle.lock().await;
            if run.cancel.is_cancelled() || task.run_epoch != epoch {
                debug!(task_id = %run.task_id, "Run ended by interruption");
                return None;
            }

            // A chapter reset for retry while the pool was winding down
            if task
                .chapters
                .iter()
                .any(|chapter| chapter.status == ChapterStatus::Pending)
            {
                continue;
            }

            let status = task.settle();
            self.metrics.task_finished();
            self.events.publish(&task);
            info!(
                task_id = %run.task_id,
                %status,
                completed = task.progress.completed_count,
                failed = task.progress.failed_count,
                "Task finished"
            );

            let next = {
                let mut queue = self.lock_queue();
                queue.finish(run.run_id);
                queue.advance()
            };
            drop(task);

            self.registry.persist_now().await;
            return next;
        }
    }
}
