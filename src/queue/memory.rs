use crate::credentials::CredentialId;
use crate::queue::task::{
    Consumer, NackDisposition, QueueStats, Settlement, Task, TaskId, TaskKey, TaskState,
};
use crate::queue::TaskQueue;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(300);

struct Claim {
    task: Task,
    owner: CredentialId,
    deadline: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<Task>,
    in_flight: HashMap<TaskId, Claim>,
    failed: Vec<Task>,
    done: u64,
}

impl QueueState {
    fn reap_expired(&mut self, now: Instant) {
        let expired: Vec<TaskId> = self
            .in_flight
            .iter()
            .filter(|(_, claim)| claim.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(claim) = self.in_flight.remove(&id) {
                tracing::warn!(
                    task = %id,
                    credential = %claim.owner,
                    "task claim timed out; returning to queue"
                );
                let mut task = claim.task;
                task.state = TaskState::Pending;
                task.affinity = None;
                self.pending.push_front(task);
            }
        }
    }

    fn claim_next(&mut self, consumer: &Consumer, claim_timeout: Duration, now: Instant) -> Option<Task> {
        let busy: Vec<TaskKey> = self.in_flight.values().map(|c| c.task.key()).collect();
        let position = self
            .pending
            .iter()
            .position(|task| consumer.accepts(task) && !busy.contains(&task.key()))?;

        let mut task = self.pending.remove(position)?;
        task.state = TaskState::InFlight;
        self.in_flight.insert(
            task.id,
            Claim {
                task: task.clone(),
                owner: consumer.credential().clone(),
                deadline: now + claim_timeout,
            },
        );
        Some(task)
    }
}

/// Process-local queue with claim timeouts.
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    claim_timeout: Duration,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CLAIM_TIMEOUT)
    }
}

impl InMemoryTaskQueue {
    pub fn new(claim_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_id: 1,
                ..QueueState::default()
            }),
            notify: Notify::new(),
            claim_timeout,
        }
    }

    pub fn claim_timeout(&self) -> Duration {
        self.claim_timeout
    }

    async fn enqueue_inner(&self, tasks: Vec<Task>) -> Vec<TaskId> {
        let mut state = self.state.lock().await;
        let mut ids = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            task.id = TaskId(state.next_id);
            state.next_id += 1;
            task.state = TaskState::Pending;
            ids.push(task.id);
            state.pending.push_back(task);
        }
        drop(state);
        self.notify.notify_waiters();
        ids
    }

    async fn dequeue_inner(&self, consumer: &Consumer, wait: Duration) -> Option<Task> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.reap_expired(now);
                if let Some(task) = state.claim_next(consumer, self.claim_timeout, now) {
                    return Some(task);
                }
            }

            if timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Removes the claim on `id` only when `consumer` still owns it.
    fn take_claim(state: &mut QueueState, consumer: &Consumer, id: TaskId) -> Option<Claim> {
        let owner = state.in_flight.get(&id).map(|claim| claim.owner.clone());
        match owner {
            Some(owner) if owner == *consumer.credential() => state.in_flight.remove(&id),
            Some(owner) => {
                tracing::warn!(
                    task = %id,
                    credential = %consumer.credential(),
                    owner = %owner,
                    "settle ignored; task is claimed by another credential"
                );
                None
            }
            None => {
                tracing::warn!(
                    task = %id,
                    credential = %consumer.credential(),
                    "settle ignored; task is no longer claimed"
                );
                None
            }
        }
    }

    async fn ack_inner(&self, consumer: &Consumer, id: TaskId) -> Settlement {
        let mut state = self.state.lock().await;
        if Self::take_claim(&mut state, consumer, id).is_none() {
            return Settlement::ClaimLost;
        }
        state.done += 1;
        Settlement::Settled
    }

    async fn nack_inner(
        &self,
        consumer: &Consumer,
        mut task: Task,
        disposition: NackDisposition,
    ) -> Settlement {
        let mut state = self.state.lock().await;
        if Self::take_claim(&mut state, consumer, task.id).is_none() {
            return Settlement::ClaimLost;
        }

        match disposition {
            NackDisposition::Requeue => {
                task.state = TaskState::Pending;
                state.pending.push_back(task);
            }
            NackDisposition::Fail => {
                task.state = TaskState::Failed;
                state.failed.push(task);
            }
        }
        drop(state);
        self.notify.notify_waiters();
        Settlement::Settled
    }

    async fn release_inner(&self, credential: &CredentialId) -> usize {
        let mut state = self.state.lock().await;
        let owned: Vec<TaskId> = state
            .in_flight
            .iter()
            .filter(|(_, claim)| claim.owner == *credential)
            .map(|(id, _)| *id)
            .collect();

        for id in &owned {
            if let Some(claim) = state.in_flight.remove(id) {
                let mut task = claim.task;
                task.state = TaskState::Pending;
                task.affinity = None;
                state.pending.push_front(task);
            }
        }
        drop(state);
        if !owned.is_empty() {
            self.notify.notify_waiters();
        }
        owned.len()
    }

    async fn stats_inner(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            done: state.done,
            failed: state.failed.len(),
        }
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(&self, tasks: Vec<Task>) -> BoxFuture<'_, Result<Vec<TaskId>>> {
        Box::pin(async move { Ok(self.enqueue_inner(tasks).await) })
    }

    fn dequeue<'a>(
        &'a self,
        consumer: &'a Consumer,
        wait: Duration,
    ) -> BoxFuture<'a, Result<Option<Task>>> {
        Box::pin(async move { Ok(self.dequeue_inner(consumer, wait).await) })
    }

    fn ack<'a>(&'a self, consumer: &'a Consumer, id: TaskId) -> BoxFuture<'a, Result<Settlement>> {
        Box::pin(async move { Ok(self.ack_inner(consumer, id).await) })
    }

    fn nack<'a>(
        &'a self,
        consumer: &'a Consumer,
        task: Task,
        disposition: NackDisposition,
    ) -> BoxFuture<'a, Result<Settlement>> {
        Box::pin(async move { Ok(self.nack_inner(consumer, task, disposition).await) })
    }

    fn release_claims<'a>(&'a self, credential: &'a CredentialId) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move { Ok(self.release_inner(credential).await) })
    }

    fn stats(&self) -> BoxFuture<'_, QueueStats> {
        Box::pin(self.stats_inner())
    }

    fn failed_tasks(&self) -> BoxFuture<'_, Vec<Task>> {
        Box::pin(async move { self.state.lock().await.failed.clone() })
    }
}
