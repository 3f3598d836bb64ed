//! Trigger side of the pipeline: turns a subject into batch tasks.

mod directory;

pub use directory::{ApiSubjectDirectory, SubjectDirectory};

use crate::identity::{RiotId, Subject};
use crate::queue::{Task, TaskId, TaskQueue};
use crate::routing::{Region, RegionRouter};
use crate::store::{DocumentStore, TrackedSubject};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

/// Splits `[0, depth)` into contiguous tasks of at most `batch_size` ids.
pub fn plan_batches(
    subject: &Subject,
    region: Region,
    depth: u32,
    batch_size: u32,
) -> Result<Vec<Task>> {
    if batch_size == 0 {
        bail!("batch_size must be greater than zero");
    }

    let mut tasks = Vec::with_capacity(depth.div_ceil(batch_size) as usize);
    let mut offset = 0;
    while offset < depth {
        let count = batch_size.min(depth - offset);
        tasks.push(Task::new(subject.clone(), region, offset, count));
        offset += count;
    }
    Ok(tasks)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReceipt {
    pub subject: Subject,
    pub region: Region,
    pub task_ids: Vec<TaskId>,
}

pub struct Orchestrator {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn SubjectDirectory>,
    router: RegionRouter,
    batch_size: u32,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn SubjectDirectory>,
        router: RegionRouter,
        batch_size: u32,
    ) -> Self {
        Self {
            queue,
            store,
            directory,
            router,
            batch_size,
        }
    }

    pub fn router(&self) -> RegionRouter {
        self.router
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Resolves `display_name` (`GameName#TAG`) and enqueues its history.
    /// Returns once the tasks are queued; extraction runs in the workers.
    #[tracing::instrument(name = "enqueue", skip(self, display_name), fields(subject = %display_name))]
    pub async fn enqueue_extraction(&self, display_name: &str, depth: u32) -> Result<EnqueueReceipt> {
        let riot_id = RiotId::parse(display_name)?;
        let region = self.router.route(&riot_id.tag_line)?;
        let subject = self.directory.lookup(&riot_id, region).await?;

        tracing::info!(
            region = %region,
            canonical = %subject,
            "subject resolved"
        );
        self.enqueue_resolved(subject, region, depth).await
    }

    /// Enqueues an already-resolved subject, routing it by its tag.
    pub async fn enqueue_known(&self, subject: Subject, depth: u32) -> Result<EnqueueReceipt> {
        let region = self.router.route(&subject.tag_line)?;
        self.enqueue_resolved(subject, region, depth).await
    }

    /// Re-enqueues every tracked subject. Subjects that fail to enqueue are
    /// logged and skipped.
    pub async fn refresh_tracked(&self, depth: u32) -> Result<Vec<EnqueueReceipt>> {
        let tracked = self
            .store
            .subjects()
            .await
            .context("failed to list tracked subjects")?;

        let mut receipts = Vec::with_capacity(tracked.len());
        for TrackedSubject { subject, region } in tracked {
            let shown = subject.display_name();
            match self.enqueue_resolved(subject, region, depth).await {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => {
                    tracing::warn!(subject = %shown, error = %err, "refresh enqueue failed");
                }
            }
        }
        tracing::info!(subjects = receipts.len(), depth, "tracked subjects re-enqueued");
        Ok(receipts)
    }

    async fn enqueue_resolved(
        &self,
        subject: Subject,
        region: Region,
        depth: u32,
    ) -> Result<EnqueueReceipt> {
        self.store
            .upsert_subject(TrackedSubject {
                subject: subject.clone(),
                region,
            })
            .await
            .context("failed to record tracked subject")?;

        let tasks = plan_batches(&subject, region, depth, self.batch_size)?;
        let planned = tasks.len();
        let task_ids = self.queue.enqueue(tasks).await?;

        tracing::info!(
            subject = %subject,
            region = %region,
            depth,
            batches = planned,
            "extraction enqueued"
        );
        Ok(EnqueueReceipt {
            subject,
            region,
            task_ids,
        })
    }
}
