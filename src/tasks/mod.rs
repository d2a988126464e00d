//! Background task substrate.
//!
//! Every unit of network work implements [`Task`]: it runs on the tokio
//! runtime, reports through an [`Emitter`], and watches a
//! [`CancellationToken`] at its own checkpoints. [`TaskHandle`] is what the
//! consumer keeps: the receiving end of the event channel plus cancel and
//! join.

pub mod aria2;
pub mod hosters;
pub mod runner;
pub mod scrape;
pub mod unrestrict;

pub use aria2::{Aria2Config, Aria2Event, Aria2Task, RemoteDispatcher};
pub use hosters::{HosterConfig, HosterEvent, HosterResolver};
pub use runner::TaskRunner;
pub use scrape::{ListingScraper, ScrapeConfig, ScrapeEvent};
pub use unrestrict::{
    LinkUnrestrictor, UnrestrictAction, UnrestrictConfig, UnrestrictEvent, UnrestrictResult,
    UnrestrictTask,
};

use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::error::TaskError;

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed,
}

#[async_trait]
pub trait Task: Send + 'static {
    type Event: Send + 'static;

    /// Short label used for task ids and logs
    fn kind(&self) -> &'static str;

    /// Terminal event for a task cancelled before `run` was ever called.
    fn cancelled_event(&self) -> Self::Event;

    /// Run to completion, emitting exactly one terminal event.
    async fn run(self, cancel: CancellationToken, emitter: Emitter<Self::Event>) -> TaskOutcome;
}

/// One-directional event sink from a task to its consumer.
pub struct Emitter<E> {
    sink: Box<dyn FnMut(E) + Send>,
}

impl<E: Send + 'static> Emitter<E> {
    pub fn new(sink: impl FnMut(E) + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    pub fn channel(sender: mpsc::UnboundedSender<E>) -> Self {
        // A consumer that stopped listening is not the task's problem
        Self::new(move |event| {
            let _ = sender.send(event);
        })
    }

    pub fn emit(&mut self, event: E) {
        (self.sink)(event)
    }
}

/// Consumer side of a running task.
#[must_use = "dropping a TaskHandle cancels the task"]
pub struct TaskHandle<E> {
    id: String,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<E>,
    join: Option<JoinHandle<TaskOutcome>>,
}

impl<E: Send + 'static> TaskHandle<E> {
    /// Start `task` on the runtime and return immediately.
    pub fn spawn<T>(task: T) -> Self
    where
        T: Task<Event = E>,
    {
        let id = new_task_id(task.kind());
        let cancel = CancellationToken::new();
        let (sender, events) = mpsc::unbounded_channel();
        let run = task.run(cancel.clone(), Emitter::channel(sender));

        Self::launch(id, cancel, events, run)
    }

    pub(crate) fn launch<F>(
        id: String,
        cancel: CancellationToken,
        events: mpsc::UnboundedReceiver<E>,
        run: F,
    ) -> Self
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        Self {
            id,
            cancel,
            events,
            join: Some(tokio::spawn(run)),
        }
    }
}

impl<E> TaskHandle<E> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cooperative cancellation; the task stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the task has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<E> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<E> {
        self.events.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Wait for the task to end. Unread events are discarded.
    pub async fn join(mut self) -> Result<TaskOutcome, TaskError> {
        match self.join.take() {
            Some(handle) => handle.await.map_err(|e| {
                if e.is_panic() {
                    TaskError::Panicked(self.id.clone())
                } else {
                    TaskError::Aborted(self.id.clone())
                }
            }),
            None => Err(TaskError::Aborted(self.id.clone())),
        }
    }

    /// Drain every event until the task ends, then join it.
    pub async fn collect(mut self) -> (Vec<E>, Result<TaskOutcome, TaskError>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.join().await)
    }

    pub async fn cancel_and_join(self) -> Result<TaskOutcome, TaskError> {
        self.cancel();
        self.join().await
    }
}

impl<E> Drop for TaskHandle<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.join.take() {
            if !handle.is_finished() {
                warn!("Task {} dropped while running, aborting it", self.id);
                self.cancel.cancel();
                handle.abort();
            }
        }
    }
}

pub(crate) fn new_task_id(kind: &str) -> String {
    format!("{}_{}", kind, &Uuid::new_v4().to_string()[..8])
}
