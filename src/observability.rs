//! Tracing setup and scheduler counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,novelbox=debug";

/// Install the global fmt subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Debug, Default)]
pub struct Metrics {
    chapters_completed: AtomicU64,
    chapters_failed: AtomicU64,
    chapter_retries: AtomicU64,
    tasks_finished: AtomicU64,
    snapshots_flushed: AtomicU64,
    flush_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn chapter_completed(&self) {
        Self::bump(&self.chapters_completed, "chapters_completed");
    }

    pub fn chapter_failed(&self) {
        Self::bump(&self.chapters_failed, "chapters_failed");
    }

    pub fn chapter_retried(&self) {
        Self::bump(&self.chapter_retries, "chapter_retries");
    }

    pub fn task_finished(&self) {
        Self::bump(&self.tasks_finished, "tasks_finished");
    }

    pub fn snapshot_flushed(&self) {
        Self::bump(&self.snapshots_flushed, "snapshots_flushed");
    }

    pub fn flush_failed(&self) {
        Self::bump(&self.flush_failures, "flush_failures");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chapters_completed: self.chapters_completed.load(Ordering::Relaxed),
            chapters_failed: self.chapters_failed.load(Ordering::Relaxed),
            chapter_retries: self.chapter_retries.load(Ordering::Relaxed),
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
            snapshots_flushed: self.snapshots_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub chapters_completed: u64,
    pub chapters_failed: u64,
    pub chapter_retries: u64,
    pub tasks_finished: u64,
    pub snapshots_flushed: u64,
    pub flush_failures: u64,
}
