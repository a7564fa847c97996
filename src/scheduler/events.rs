use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::{Task, TaskStatus};

/// Emitted after every task or chapter transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub completed_count: usize,
    pub failed_count: usize,
}

impl TaskUpdate {
    pub fn of(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            progress_percent: task.progress.progress_percent,
            completed_count: task.progress.completed_count,
            failed_count: task.progress.failed_count,
        }
    }
}

/// Fan-out of task updates; sending with no subscribers is not an error
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, task: &Task) {
        let _ = self.sender.send(TaskUpdate::of(task));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskUpdate> {
        self.sender.subscribe()
    }
}
