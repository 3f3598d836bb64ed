//! Task handoff between the orchestrator and the extraction workers.
//!
//! A dequeued task is claimed by exactly one consumer until it is acked,
//! nacked, released, or its claim times out.

pub mod memory;
pub mod task;

pub use memory::InMemoryTaskQueue;
pub use task::{
    Consumer, NackDisposition, QueueStats, Settlement, Task, TaskId, TaskKey, TaskState,
};

use crate::credentials::CredentialId;
use anyhow::Result;
use futures::future::BoxFuture;
use std::time::Duration;

pub trait TaskQueue: Send + Sync {
    /// Appends tasks in order and returns the ids assigned to them.
    fn enqueue(&self, tasks: Vec<Task>) -> BoxFuture<'_, Result<Vec<TaskId>>>;

    /// Claims the first eligible task, waiting up to `wait` for one to arrive.
    fn dequeue<'a>(
        &'a self,
        consumer: &'a Consumer,
        wait: Duration,
    ) -> BoxFuture<'a, Result<Option<Task>>>;

    /// Marks a task done if `consumer` still holds its claim.
    fn ack<'a>(&'a self, consumer: &'a Consumer, id: TaskId) -> BoxFuture<'a, Result<Settlement>>;

    /// Returns a claimed task. `task` carries the caller's updates (advanced
    /// offset, cleared affinity, attempt count, last error).
    ///
    /// A claim lost to expiry or release is reported as
    /// [`Settlement::ClaimLost`] and changes nothing.
    fn nack<'a>(
        &'a self,
        consumer: &'a Consumer,
        task: Task,
        disposition: NackDisposition,
    ) -> BoxFuture<'a, Result<Settlement>>;

    /// Puts every task claimed by `credential` back on the queue.
    fn release_claims<'a>(&'a self, credential: &'a CredentialId) -> BoxFuture<'a, Result<usize>>;

    fn stats(&self) -> BoxFuture<'_, QueueStats>;

    fn failed_tasks(&self) -> BoxFuture<'_, Vec<Task>>;
}
