use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The task currently spawning workers
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub task_id: String,
    /// Distinguishes successive activations, so a stale driver cannot clear a newer run
    pub run_id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Nothing was active; the caller must drive this run
    Activated(ActiveRun),
    /// Waiting behind the active task, 1-based position
    Queued(usize),
    /// Already active or waiting
    Present,
}

impl PartialEq for ActiveRun {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id && self.run_id == other.run_id
    }
}

impl Eq for ActiveRun {}

/// FIFO of started tasks plus the single active slot.
///
/// Pure bookkeeping: it never touches task records.
#[derive(Debug, Default)]
pub struct TaskQueue {
    active: Option<ActiveRun>,
    waiting: VecDeque<String>,
    next_run_id: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveRun> {
        self.active.as_ref()
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.task_id == task_id)
    }

    pub fn waiting(&self) -> Vec<String> {
        self.waiting.iter().cloned().collect()
    }

    pub fn admit(&mut self, task_id: &str) -> Admission {
        if self.is_active(task_id) || self.waiting.iter().any(|id| id == task_id) {
            return Admission::Present;
        }

        if self.active.is_some() {
            self.waiting.push_back(task_id.to_string());
            debug!(task_id, position = self.waiting.len(), "Task queued");
            return Admission::Queued(self.waiting.len());
        }

        Admission::Activated(self.activate(task_id.to_string()))
    }

    fn activate(&mut self, task_id: String) -> ActiveRun {
        self.next_run_id += 1;
        let run = ActiveRun {
            task_id,
            run_id: self.next_run_id,
            cancel: CancellationToken::new(),
        };
        debug!(task_id = %run.task_id, run_id = run.run_id, "Task activated");
        self.active = Some(run.clone());
        run
    }

    /// Take the id out of the queue wherever it is.
    ///
    /// Returns the active run if `task_id` was the active task; its token is
    /// already cancelled.
    pub fn withdraw(&mut self, task_id: &str) -> Option<ActiveRun> {
        self.waiting.retain(|id| id != task_id);

        if self.is_active(task_id) {
            let run = self.active.take()?;
            run.cancel.cancel();
            return Some(run);
        }
        None
    }

    /// End run `run_id` if it is still the active one
    pub fn finish(&mut self, run_id: u64) -> bool {
        if self.active.as_ref().is_some_and(|run| run.run_id == run_id) {
            self.active = None;
            return true;
        }
        false
    }

    /// Activate the head of the FIFO when the slot is free
    pub fn advance(&mut self) -> Option<ActiveRun> {
        if self.active.is_some() {
            return None;
        }
        let next = self.waiting.pop_front()?;
        Some(self.activate(next))
    }

    /// Cancel and forget everything; used at shutdown
    pub fn drain(&mut self) -> Option<ActiveRun> {
        self.waiting.clear();
        let run = self.active.take()?;
        run.cancel.cancel();
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activated(admission: Admission) -> ActiveRun {
        match admission {
            Admission::Activated(run) => run,
            other => panic!("expected activation, got {other:?}"),
        }
    }

    #[test]
    fn test_first_task_activates_rest_queue() {
        let mut queue = TaskQueue::new();

        let run = activated(queue.admit("a"));
        assert_eq!(run.task_id, "a");
        assert_eq!(queue.admit("b"), Admission::Queued(1));
        assert_eq!(queue.admit("c"), Admission::Queued(2));
        assert_eq!(queue.admit("b"), Admission::Present);
        assert_eq!(queue.admit("a"), Admission::Present);
        assert_eq!(queue.waiting(), vec!["b", "c"]);
    }

    #[test]
    fn test_finish_then_advance_is_fifo() {
        let mut queue = TaskQueue::new();
        let run = activated(queue.admit("a"));
        queue.admit("b");
        queue.admit("c");

        assert!(queue.advance().is_none());
        assert!(queue.finish(run.run_id));
        let next = queue.advance().unwrap();
        assert_eq!(next.task_id, "b");
        assert!(next.run_id > run.run_id);
        assert_eq!(queue.waiting(), vec!["c"]);
    }

    #[test]
    fn test_stale_finish_is_ignored() {
        let mut queue = TaskQueue::new();
        let first = activated(queue.admit("a"));
        queue.withdraw("a");
        let second = activated(queue.admit("a"));

        assert!(!queue.finish(first.run_id));
        assert!(queue.is_active("a"));
        assert!(queue.finish(second.run_id));
    }

    #[test]
    fn test_withdraw_cancels_active_run() {
        let mut queue = TaskQueue::new();
        let run = activated(queue.admit("a"));
        queue.admit("b");

        assert!(queue.withdraw("b").is_none());
        assert_eq!(queue.waiting(), Vec::<String>::new());

        let withdrawn = queue.withdraw("a").unwrap();
        assert!(withdrawn.cancel.is_cancelled());
        assert!(run.cancel.is_cancelled());
        assert!(queue.active().is_none());
    }
}
