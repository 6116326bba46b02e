//! Phased task scheduler for a run.
//!
//! Tasks are registered lazily (as closures producing futures) under one of
//! three phases and executed by a single background task once started:
//! every `Load` task, then every `Run` task, then every `Cleanup` task, each
//! phase in submission order.
//!
//! When a task fails, the remaining tasks are skipped unless they were
//! registered as `must_complete`. Cleanup registered that way therefore runs
//! no matter what happened before it.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskQueuePhase {
    Load,
    Run,
    Cleanup,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskQueueError {
    #[error("Task queue already started; cannot add task '{0}'")]
    AlreadyStarted(String),
}

/// Registration record, kept for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub phase: TaskQueuePhase,
    pub name: String,
    pub must_complete: bool,
}

/// A task that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub phase: TaskQueuePhase,
    pub name: String,
    pub message: String,
}

/// What happened once every phase drained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQueueOutcome {
    pub failures: Vec<TaskFailure>,
    /// Names of tasks skipped after a failure.
    pub skipped: Vec<String>,
}

type TaskFactory = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct PendingTask {
    record: TaskRecord,
    factory: TaskFactory,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<PendingTask>,
    registered: Vec<TaskRecord>,
    started: bool,
}

pub struct TaskQueue {
    state: Mutex<QueueState>,
    outcome: Arc<watch::Sender<Option<TaskQueueOutcome>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            state: Mutex::new(QueueState::default()),
            outcome: Arc::new(outcome),
        }
    }

    /// Register a task. Nothing runs until [`TaskQueue::start`].
    pub fn add<F, Fut>(
        &self,
        phase: TaskQueuePhase,
        name: impl Into<String>,
        must_complete: bool,
        task: F,
    ) -> Result<(), TaskQueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut state = self.state.lock();
        if state.started {
            return Err(TaskQueueError::AlreadyStarted(name));
        }

        let record = TaskRecord {
            phase,
            name,
            must_complete,
        };
        debug!(?phase, task = %record.name, must_complete, "Task registered");
        state.registered.push(record.clone());
        state.pending.push(PendingTask {
            record,
            factory: Box::new(move || task().boxed()),
        });
        Ok(())
    }

    /// Start executing in the background. Returns false if already started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut tasks = {
            let mut state = self.state.lock();
            if state.started {
                return false;
            }
            state.started = true;
            std::mem::take(&mut state.pending)
        };
        // Stable sort keeps submission order within a phase.
        tasks.sort_by_key(|task| task.record.phase);

        let outcome_tx = Arc::clone(&self.outcome);
        tokio::spawn(async move {
            let outcome = run_tasks(tasks).await;
            outcome_tx.send_replace(Some(outcome));
        });
        info!("Task queue started");
        true
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Everything registered so far, in registration order.
    pub fn registered_tasks(&self) -> Vec<TaskRecord> {
        self.state.lock().registered.clone()
    }

    /// Wait until every phase has drained. Returns immediately with an empty
    /// outcome if the queue was never started.
    pub async fn join(&self) -> TaskQueueOutcome {
        if !self.is_started() {
            return TaskQueueOutcome::default();
        }
        let mut rx = self.outcome.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return TaskQueueOutcome::default();
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_tasks(tasks: Vec<PendingTask>) -> TaskQueueOutcome {
    let mut outcome = TaskQueueOutcome::default();

    for task in tasks {
        let PendingTask { record, factory } = task;
        if !outcome.failures.is_empty() && !record.must_complete {
            debug!(task = %record.name, "Skipping task after earlier failure");
            outcome.skipped.push(record.name);
            continue;
        }

        debug!(phase = ?record.phase, task = %record.name, "Running task");
        // Spawned so a panicking task is reported instead of tearing down the queue.
        let message = match tokio::spawn(factory()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{:#}", err)),
            Err(join_err) => Some(format!("task panicked: {}", join_err)),
        };

        if let Some(message) = message {
            error!(task = %record.name, "Task failed: {}", message);
            outcome.failures.push(TaskFailure {
                phase: record.phase,
                name: record.name,
                message,
            });
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, entry: &str) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<()>> {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        move || {
            async move {
                log.lock().push(entry);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let log = recorder();
        let queue = TaskQueue::new();
        queue.add(TaskQueuePhase::Cleanup, "cleanup", true, push(&log, "cleanup")).unwrap();
        queue.add(TaskQueuePhase::Run, "run-1", false, push(&log, "run-1")).unwrap();
        queue.add(TaskQueuePhase::Load, "load", false, push(&log, "load")).unwrap();
        queue.add(TaskQueuePhase::Run, "run-2", false, push(&log, "run-2")).unwrap();

        assert!(queue.start());
        let outcome = queue.join().await;

        assert!(outcome.failures.is_empty());
        assert_eq!(*log.lock(), vec!["load", "run-1", "run-2", "cleanup"]);
    }

    #[tokio::test]
    async fn test_failure_skips_all_but_must_complete() {
        let log = recorder();
        let queue = TaskQueue::new();
        queue
            .add(TaskQueuePhase::Run, "boom", false, || async {
                Err(anyhow::anyhow!("protocol exploded"))
            })
            .unwrap();
        queue.add(TaskQueuePhase::Run, "after", false, push(&log, "after")).unwrap();
        queue.add(TaskQueuePhase::Cleanup, "cleanup", true, push(&log, "cleanup")).unwrap();

        queue.start();
        let outcome = queue.join().await;

        assert_eq!(*log.lock(), vec!["cleanup"]);
        assert_eq!(outcome.skipped, vec!["after".to_string()]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name, "boom");
        assert!(outcome.failures[0].message.contains("protocol exploded"));
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let log = recorder();
        let queue = TaskQueue::new();
        queue
            .add(TaskQueuePhase::Run, "panics", false, || async {
                if true {
                    panic!("oh no");
                }
                Ok(())
            })
            .unwrap();
        queue.add(TaskQueuePhase::Cleanup, "cleanup", true, push(&log, "cleanup")).unwrap();

        queue.start();
        let outcome = queue.join().await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(*log.lock(), vec!["cleanup"]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_closes_registration() {
        let queue = TaskQueue::new();
        assert!(!queue.is_started());
        assert!(queue.start());
        assert!(!queue.start());
        assert!(queue.is_started());

        let late = queue.add(TaskQueuePhase::Run, "late", false, || async { Ok(()) });
        assert_eq!(late, Err(TaskQueueError::AlreadyStarted("late".into())));
        assert_eq!(queue.join().await, TaskQueueOutcome::default());
    }

    #[tokio::test]
    async fn test_join_without_start_returns() {
        let queue = TaskQueue::new();
        queue.add(TaskQueuePhase::Run, "never", false, || async { Ok(()) }).unwrap();
        assert_eq!(queue.join().await, TaskQueueOutcome::default());
    }
}
