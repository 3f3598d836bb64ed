use crate::credentials::CredentialRegistry;
use crate::queue::TaskQueue;
use crate::rank::RankResolver;
use crate::runtime::telemetry::Telemetry;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;

pub struct WorkerShared {
    pub(super) queue: Arc<dyn TaskQueue>,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) registry: Arc<CredentialRegistry>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) rank: Arc<RankResolver>,
    pub(super) poll_interval: Duration,
    pub(super) task_retry_ceiling: u32,
}

pub struct WorkerSharedParams {
    pub queue: Arc<dyn TaskQueue>,
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<CredentialRegistry>,
    pub telemetry: Arc<Telemetry>,
    pub rank: Arc<RankResolver>,
    pub poll_interval: Duration,
    pub task_retry_ceiling: u32,
}

impl WorkerShared {
    pub fn new(params: WorkerSharedParams) -> Self {
        Self {
            queue: params.queue,
            store: params.store,
            registry: params.registry,
            telemetry: params.telemetry,
            rank: params.rank,
            poll_interval: params.poll_interval,
            task_retry_ceiling: params.task_retry_ceiling.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<CredentialRegistry> {
        &self.registry
    }
}

impl Clone for WorkerShared {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            telemetry: Arc::clone(&self.telemetry),
            rank: Arc::clone(&self.rank),
            poll_interval: self.poll_interval,
            task_retry_ceiling: self.task_retry_ceiling,
        }
    }
}
