use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Emitter, Task, TaskHandle, TaskOutcome, new_task_id};

type Registry = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Launches tasks with a ceiling on how many run at once and keeps a registry
/// of the ones still active.
#[derive(Clone)]
pub struct TaskRunner {
    semaphore: Arc<Semaphore>,
    active_tasks: Registry,
    task_ended: Arc<Notify>,
}

/// Owned by the spawned future. Dropping it, on return or on abort, takes the
/// task out of the registry.
struct Registration {
    id: String,
    active_tasks: Registry,
    task_ended: Arc<Notify>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        lock(&self.active_tasks).remove(&self.id);
        self.task_ended.notify_waiters();
    }
}

// The map holds no invariant a panicking holder could break
fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            active_tasks: Arc::new(Mutex::new(HashMap::new())),
            task_ended: Arc::new(Notify::new()),
        }
    }

    /// Start `task`. Returns at once; if the runner is saturated the task
    /// waits for a slot on its own, and a cancel while waiting ends it with
    /// the task's cancelled event before it does any work.
    pub async fn start<T: Task>(&self, task: T) -> TaskHandle<T::Event> {
        let id = new_task_id(task.kind());
        let cancel = CancellationToken::new();
        let (sender, events) = mpsc::unbounded_channel();

        lock(&self.active_tasks).insert(id.clone(), cancel.clone());
        let registration = Registration {
            id: id.clone(),
            active_tasks: Arc::clone(&self.active_tasks),
            task_ended: Arc::clone(&self.task_ended),
        };

        let semaphore = Arc::clone(&self.semaphore);
        let task_cancel = cancel.clone();

        let run = async move {
            let registration = registration;
            let mut emitter = Emitter::channel(sender);

            let outcome = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => {
                    debug!("Task {} cancelled before it got a slot", registration.id);
                    emitter.emit(task.cancelled_event());
                    TaskOutcome::Cancelled
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(_permit) => {
                        // Permit lives until the task body returns
                        task.run(task_cancel.clone(), emitter).await
                    }
                    Err(_) => {
                        emitter.emit(task.cancelled_event());
                        TaskOutcome::Cancelled
                    }
                },
            };

            debug!("Task {} finished: {:?}", registration.id, outcome);
            outcome
        };

        TaskHandle::launch(id, cancel, events, run)
    }

    pub fn cancel(&self, id: &str) -> bool {
        match lock(&self.active_tasks).get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let tasks = lock(&self.active_tasks);
        info!("Cancelling {} active task(s)", tasks.len());
        for token in tasks.values() {
            token.cancel();
        }
    }

    /// Cancel every active task and wait until all of them have ended.
    pub async fn shutdown(&self) {
        self.cancel_all();

        loop {
            let ended = self.task_ended.notified();
            tokio::pin!(ended);
            // Register before checking so a task ending in between is not missed
            ended.as_mut().enable();

            if lock(&self.active_tasks).is_empty() {
                break;
            }
            ended.await;
        }
    }

    pub fn active_tasks(&self) -> Vec<String> {
        lock(&self.active_tasks).keys().cloned().collect()
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Sleeper;

    #[async_trait]
    impl Task for Sleeper {
        type Event = &'static str;

        fn kind(&self) -> &'static str {
            "sleeper"
        }

        fn cancelled_event(&self) -> &'static str {
            "cancelled"
        }

        async fn run(self, cancel: CancellationToken, mut emitter: Emitter<&'static str>) -> TaskOutcome {
            emitter.emit("started");
            tokio::select! {
                _ = cancel.cancelled() => {
                    emitter.emit(self.cancelled_event());
                    TaskOutcome::Cancelled
                }
                _ = tokio::time::sleep(Duration::from_secs(30)) => {
                    emitter.emit("done");
                    TaskOutcome::Completed
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_by_id() {
        let runner = TaskRunner::new(2);
        let mut handle = runner.start(Sleeper).await;
        assert_eq!(handle.next_event().await, Some("started"));
        assert_eq!(runner.active_tasks(), vec![handle.id().to_string()]);

        assert!(runner.cancel(handle.id()));
        assert_eq!(handle.join().await, Ok(TaskOutcome::Cancelled));
        assert!(runner.active_tasks().is_empty());
        assert!(!runner.cancel("sleeper_missing"));
    }

    #[tokio::test]
    async fn test_saturated_runner_queues_tasks() {
        let runner = TaskRunner::new(1);
        let mut first = runner.start(Sleeper).await;
        assert_eq!(first.next_event().await, Some("started"));
        assert_eq!(runner.available_slots(), 0);

        let second = runner.start(Sleeper).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        // Cancelled while still waiting for a slot
        second.cancel();
        let (events, outcome) = second.collect().await;
        assert_eq!(events, vec!["cancelled"]);
        assert_eq!(outcome, Ok(TaskOutcome::Cancelled));

        runner.cancel_all();
        assert_eq!(first.join().await, Ok(TaskOutcome::Cancelled));
        assert_eq!(runner.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let runner = TaskRunner::new(4);
        let mut handles = Vec::new();
        for _ in 0..3 {
            let mut handle = runner.start(Sleeper).await;
            assert_eq!(handle.next_event().await, Some("started"));
            handles.push(handle);
        }

        tokio::time::timeout(Duration::from_secs(5), runner.shutdown())
            .await
            .unwrap();
        assert!(runner.active_tasks().is_empty());

        for handle in handles {
            assert_eq!(handle.join().await, Ok(TaskOutcome::Cancelled));
        }
    }

    #[tokio::test]
    async fn test_shutdown_after_dropping_running_handle() {
        let runner = TaskRunner::new(2);
        let mut handle = runner.start(Sleeper).await;
        assert_eq!(handle.next_event().await, Some("started"));

        // Aborts the task; its registry entry must still go away
        drop(handle);

        let finished = tokio::time::timeout(Duration::from_secs(2), runner.shutdown()).await;
        assert!(finished.is_ok());
        assert!(runner.active_tasks().is_empty());
    }
}
