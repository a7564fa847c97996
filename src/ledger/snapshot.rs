//! Task map blob format and crash recovery.
//!
//! The blob is a versioned JSON document. Decoding normalises anything a crash
//! may have left mid-flight: `downloading` tasks come back `paused`, and
//! `downloading` chapters come back `pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{LedgerError, Result};
use crate::task::{ChapterStatus, Task, TaskStatus};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TaskMapSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    tasks: Vec<Task>,
}

pub fn encode<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        saved_at: DateTime<Utc>,
        tasks: Vec<&'a Task>,
    }

    let snapshot = Borrowed {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        tasks: tasks.into_iter().collect(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

/// Decode a blob and apply crash recovery to every task
pub fn decode(blob: &[u8]) -> Result<Vec<Task>> {
    let snapshot: TaskMapSnapshot = serde_json::from_slice(blob)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(LedgerError::UnsupportedVersion(snapshot.version));
    }

    let mut tasks = snapshot.tasks;
    let mut recovered = 0;
    for task in &mut tasks {
        if recover(task) {
            recovered += 1;
        }
    }

    info!(
        tasks = tasks.len(),
        recovered,
        saved_at = %snapshot.saved_at,
        "Task map decoded"
    );
    Ok(tasks)
}

/// Normalise in-flight state; returns true if anything changed
pub fn recover(task: &mut Task) -> bool {
    let mut changed = false;

    if task.status == TaskStatus::Downloading {
        task.status = TaskStatus::Paused;
        changed = true;
    }

    for chapter in &mut task.chapters {
        if chapter.status == ChapterStatus::Downloading {
            chapter.release();
            changed = true;
        }
    }

    task.recompute_progress();
    changed
}
