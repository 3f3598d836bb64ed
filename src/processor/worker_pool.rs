//! Spawns one extraction worker per credential and supervises them.
//!
//! A worker that errors or panics is logged, its credential is retired, and
//! its claims go back to the queue; the rest of the pool keeps running.

use crate::credentials::{CredentialId, CredentialSession};
use crate::processor::worker::{Worker, WorkerExit, WorkerShared};
use futures::FutureExt;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct WorkerPool {
    shared: WorkerShared,
    workers: Vec<JoinHandle<()>>,
    running: Arc<AtomicUsize>,
    workers_done_tx: Option<watch::Sender<bool>>,
}

impl WorkerPool {
    pub fn new(shared: WorkerShared) -> Self {
        Self {
            shared,
            workers: Vec::new(),
            running: Arc::new(AtomicUsize::new(0)),
            workers_done_tx: None,
        }
    }

    /// Number of workers whose loop has not ended yet.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn handles(&self) -> &[JoinHandle<()>] {
        &self.workers
    }

    /// Spawns a worker for every session. The returned receiver flips to
    /// `true` once every worker has exited.
    pub fn launch(&mut self, sessions: Vec<CredentialSession>) -> watch::Receiver<bool> {
        self.workers.clear();

        let (workers_done_tx, workers_done_rx) = watch::channel(false);
        self.workers_done_tx = Some(workers_done_tx.clone());
        self.running.store(sessions.len(), Ordering::SeqCst);

        for (worker_id, session) in sessions.into_iter().enumerate() {
            let worker = Worker::new(worker_id, session, self.shared.clone());
            let credential = worker.credential().clone();
            let shared = self.shared.clone();
            let running = self.running.clone();
            let workers_done = workers_done_tx.clone();

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(WorkerExit::Cancelled)) => {
                        tracing::debug!(worker = worker_id, "worker stopped");
                    }
                    Ok(Ok(WorkerExit::CredentialDead)) => {
                        tracing::warn!(
                            worker = worker_id,
                            credential = %credential,
                            "worker retired with its credential"
                        );
                    }
                    Ok(Err(err)) => {
                        tracing::error!(
                            worker = worker_id,
                            credential = %credential,
                            error = %err,
                            "worker task exited with error"
                        );
                        retire(&shared, &credential).await;
                    }
                    Err(panic_payload) => {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            worker = worker_id,
                            credential = %credential,
                            panic = %panic_msg,
                            "worker task panicked"
                        );
                        retire(&shared, &credential).await;
                    }
                }

                if running.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = workers_done.send(true);
                }
            });

            self.workers.push(handle);
        }

        if self.workers.is_empty() {
            let _ = workers_done_tx.send(true);
        }

        tracing::info!(workers = self.workers.len(), "worker pool launched");
        workers_done_rx
    }

    /// Hands back the worker handles so the caller can await them after
    /// cancelling the shared token.
    pub fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        self.workers_done_tx = None;
        std::mem::take(&mut self.workers)
    }
}

/// Takes a failed worker's credential out of routing so no task stays pinned
/// to it, then returns its claims.
async fn retire(shared: &WorkerShared, credential: &CredentialId) {
    shared.registry().mark_dead(credential);
    match shared.queue().release_claims(credential).await {
        Ok(released) if released > 0 => {
            tracing::info!(credential = %credential, released, "released claims of failed worker");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(credential = %credential, error = %err, "failed to release claims");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
