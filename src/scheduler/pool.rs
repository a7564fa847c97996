//! Bounded set of chapter workers for one task run

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::events::EventBus;
use super::registry::{TaskHandle, TaskRegistry};
use crate::fetcher::ContentFetcher;
use crate::observability::Metrics;
use crate::task::{AuthContext, RetryDecision, RetryPolicy};

/// One activation of a task
#[derive(Clone)]
pub struct RunContext {
    pub task_id: String,
    pub handle: TaskHandle,
    /// Task epoch at activation; results are only written while it still matches
    pub epoch: u64,
    pub cancel: CancellationToken,
}

/// Everything a worker needs to fetch a claimed chapter without the task lock
struct Claim {
    index: usize,
    source_ref: String,
    chapter_ref: String,
    auth: AuthContext,
    policy: RetryPolicy,
}

#[derive(Clone)]
pub struct ChapterWorkerPool {
    fetcher: Arc<dyn ContentFetcher>,
    registry: Arc<TaskRegistry>,
    events: EventBus,
    metrics: Arc<Metrics>,
}

impl ChapterWorkerPool {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        registry: Arc<TaskRegistry>,
        events: EventBus,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            events,
            metrics,
        }
    }

    /// Run up to `concurrency` workers until none can claim anything, then
    /// return. Never spawns more workers than there are pending chapters.
    pub async fn run(&self, run: &RunContext, concurrency: usize) -> usize {
        let pending = run.handle.lock().await.pending_chapters();
        let spawned = concurrency.min(pending);

        let mut workers = JoinSet::new();
        for worker_id in 0..spawned {
            let pool = self.clone();
            let run = run.clone();
            workers.spawn(async move { pool.work(run, worker_id).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(task_id = %run.task_id, error = %e, "Chapter worker panicked");
            }
        }
        spawned
    }

    async fn work(self, run: RunContext, worker_id: usize) {
        let mut claimed_before = false;

        loop {
            if claimed_before {
                let interval = run.handle.lock().await.settings.chapter_interval;
                if !wait_or_cancel(interval, &run.cancel).await {
                    break;
                }
            }

            let Some(claim) = self.claim(&run).await else {
                break;
            };
            claimed_before = true;

            debug!(
                task_id = %run.task_id,
                worker_id,
                chapter = claim.index,
                "Chapter claimed"
            );
            let result = self
                .fetcher
                .fetch(&claim.source_ref, &claim.chapter_ref, &claim.auth)
                .await;

            let retry_delay = {
                let mut task = run.handle.lock().await;
                if task.run_epoch != run.epoch {
                    debug!(
                        task_id = %run.task_id,
                        chapter = claim.index,
                        "Run interrupted, discarding chapter result"
                    );
                    break;
                }

                let chapter = &mut task.chapters[claim.index];
                let retry_delay = match result {
                    Ok(content) => {
                        debug!(
                            task_id = %run.task_id,
                            chapter = claim.index,
                            size = content.len(),
                            "Chapter completed"
                        );
                        chapter.complete(content);
                        self.metrics.chapter_completed();
                        None
                    }
                    Err(e) => {
                        chapter.attempt_count += 1;
                        match claim.policy.decide(chapter.attempt_count) {
                            RetryDecision::Retry(delay) => {
                                warn!(
                                    task_id = %run.task_id,
                                    chapter = claim.index,
                                    attempt = chapter.attempt_count,
                                    error = %e,
                                    "Chapter fetch failed, will retry"
                                );
                                self.metrics.chapter_retried();
                                Some(delay)
                            }
                            RetryDecision::Fail => {
                                warn!(
                                    task_id = %run.task_id,
                                    chapter = claim.index,
                                    attempts = chapter.attempt_count,
                                    error = %e,
                                    "Chapter failed permanently"
                                );
                                chapter.fail(e.to_string());
                                self.metrics.chapter_failed();
                                None
                            }
                        }
                    }
                };

                task.recompute_progress();
                self.registry.mark_dirty();
                self.events.publish(&task);
                retry_delay
            };

            if let Some(delay) = retry_delay {
                // The chapter stays claimed by this worker during the delay
                if !wait_or_cancel(delay, &run.cancel).await {
                    break;
                }
                let mut task = run.handle.lock().await;
                if task.run_epoch != run.epoch {
                    break;
                }
                task.chapters[claim.index].release();
                task.recompute_progress();
                self.registry.mark_dirty();
                self.events.publish(&task);
            }
        }

        debug!(task_id = %run.task_id, worker_id, "Chapter worker exiting");
    }

    async fn claim(&self, run: &RunContext) -> Option<Claim> {
        if run.cancel.is_cancelled() {
            return None;
        }

        let mut task = run.handle.lock().await;
        if task.run_epoch != run.epoch {
            return None;
        }

        let index = task.claim_next()?;
        self.registry.mark_dirty();
        self.events.publish(&task);

        Some(Claim {
            index,
            source_ref: task.source_ref.clone(),
            chapter_ref: task.chapters[index].source_ref.clone(),
            auth: task.auth.clone(),
            policy: RetryPolicy::from_settings(&task.settings),
        })
    }
}

/// Sleep unless cancelled first; false means the run was stopped
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher;
    use crate::ledger::MemoryStore;
    use crate::task::{ChapterSpec, ChapterStatus, Task, TaskDefaults, TaskLimits, TaskSpec};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Returns the chapter reference as its content
    struct EchoFetcher;

    #[async_trait]
    impl ContentFetcher for EchoFetcher {
        async fn fetch(
            &self,
            _source_ref: &str,
            chapter_ref: &str,
            _auth: &AuthContext,
        ) -> fetcher::Result<String> {
            Ok(chapter_ref.to_string())
        }
    }

    fn create_pool() -> ChapterWorkerPool {
        let metrics = Arc::new(Metrics::new());
        let limits = TaskLimits {
            max_chapters: 10,
            max_concurrency: 4,
        };
        let registry = Arc::new(TaskRegistry::new(
            Arc::new(MemoryStore::new()),
            TaskDefaults::default(),
            limits,
            metrics.clone(),
        ));
        ChapterWorkerPool::new(Arc::new(EchoFetcher), registry, EventBus::new(16), metrics)
    }

    fn run_for(chapters: usize) -> RunContext {
        let spec = TaskSpec::builder()
            .title("Book")
            .chapters(
                (0..chapters)
                    .map(|i| ChapterSpec::new(format!("Chapter {i}"), format!("/{i}")))
                    .collect(),
            )
            .build();
        let task = Task::from_spec("task_1".into(), spec, &TaskDefaults::default());

        RunContext {
            task_id: "task_1".into(),
            handle: Arc::new(Mutex::new(task)),
            epoch: 0,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_workers_capped_by_pending_chapters() {
        let pool = create_pool();
        let run = run_for(1);

        assert_eq!(pool.run(&run, usize::MAX).await, 1);

        let task = run.handle.lock().await;
        assert_eq!(task.chapters[0].status, ChapterStatus::Completed);
        assert_eq!(task.chapters[0].content.as_deref(), Some("/0"));
    }

    #[tokio::test]
    async fn test_no_workers_once_everything_is_done() {
        let pool = create_pool();
        let run = run_for(3);

        assert_eq!(pool.run(&run, 2).await, 2);
        assert_eq!(run.handle.lock().await.progress.completed_count, 3);
        assert_eq!(pool.run(&run, 2).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_claims_nothing() {
        let pool = create_pool();
        let run = run_for(2);
        run.cancel.cancel();

        pool.run(&run, 2).await;

        let task = run.handle.lock().await;
        assert_eq!(task.pending_chapters(), 2);
    }
}
