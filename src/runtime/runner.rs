use crate::api::{ApiClientOptions, HttpApiClient, UpstreamApi};
use crate::credentials::{Credential, CredentialRegistry, CredentialSession};
use crate::processor::orchestrator::{ApiSubjectDirectory, Orchestrator};
use crate::processor::worker::{WorkerShared, WorkerSharedParams};
use crate::processor::worker_pool::WorkerPool;
use crate::queue::{InMemoryTaskQueue, QueueStats, TaskQueue};
use crate::rank::RankResolver;
use crate::runtime::config::ExtractorConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::store::{DocumentStore, InMemoryDocumentStore};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Wires the orchestrator, queue, store, and worker pool together and handles
/// OS signals for graceful shutdowns.
pub struct Runner {
    config: ExtractorConfig,
    api: Arc<dyn UpstreamApi>,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn DocumentStore>,
    registry: Arc<CredentialRegistry>,
    telemetry: Arc<Telemetry>,
    orchestrator: Orchestrator,
    pool: Option<WorkerPool>,
    workers_done: Option<watch::Receiver<bool>>,
    reporter: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Runner {
    /// Builds a runner with the HTTP upstream client and in-memory queue and
    /// store.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let options = ApiClientOptions {
            request_timeout: config.request_timeout(),
            base_url_template: config.api_base_url().to_owned(),
            ..ApiClientOptions::default()
        };
        let api: Arc<dyn UpstreamApi> = Arc::new(HttpApiClient::with_options(options)?);
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new(config.claim_timeout()));
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        Self::with_components(config, api, queue, store)
    }

    pub fn with_components(
        config: ExtractorConfig,
        api: Arc<dyn UpstreamApi>,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let telemetry = Arc::new(Telemetry::default());

        let lookup_sessions = lookup_sessions(&config, &api, &telemetry, &shutdown)?;
        let directory = Arc::new(ApiSubjectDirectory::new(lookup_sessions));
        let orchestrator = Orchestrator::new(
            queue.clone(),
            store.clone(),
            directory,
            config.router(),
            config.batch_size(),
        );

        Ok(Self {
            config,
            api,
            queue,
            store,
            registry: Arc::new(CredentialRegistry::default()),
            telemetry,
            orchestrator,
            pool: None,
            workers_done: None,
            reporter: None,
            shutdown,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn queue(&self) -> Arc<dyn TaskQueue> {
        self.queue.clone()
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> Arc<CredentialRegistry> {
        self.registry.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Spawns one worker per configured key plus the metrics reporter.
    /// A stopped runner cannot be started again.
    pub async fn start(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            bail!("runner was shut down and cannot be restarted");
        }

        let sessions = self
            .config
            .api_keys()
            .iter()
            .enumerate()
            .map(|(idx, secret)| {
                let credential = Credential::new(
                    format!("key-{}", idx + 1),
                    secret.as_str(),
                    self.config.rate_windows().to_vec(),
                    self.config.cooldown(),
                )?;
                Ok(CredentialSession::new(
                    credential,
                    self.api.clone(),
                    self.registry.clone(),
                    self.config.retry(),
                    self.telemetry.clone(),
                    self.shutdown.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let shared = WorkerShared::new(WorkerSharedParams {
            queue: self.queue.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            telemetry: self.telemetry.clone(),
            rank: Arc::new(RankResolver::standard(self.config.sweep().clone())),
            poll_interval: self.config.poll_interval(),
            task_retry_ceiling: self.config.task_retry_ceiling(),
        });

        let workers = sessions.len();
        let mut pool = WorkerPool::new(shared);
        self.workers_done = Some(pool.launch(sessions));
        self.pool = Some(pool);
        self.reporter = Some(spawn_metrics_reporter(
            self.telemetry.clone(),
            self.queue.clone(),
            self.shutdown.clone(),
            self.config.metrics_interval(),
        ));

        tracing::info!(workers, batch_size = self.config.batch_size(), "runner started");
        Ok(())
    }

    /// Cancels the root token and waits for every worker to finish its
    /// current call.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown.cancel();

        if let Some(mut pool) = self.pool.take() {
            for handle in pool.shutdown() {
                if let Err(err) = handle.await {
                    tracing::warn!(error = %err, "worker task join failed");
                }
            }
        }
        if let Some(reporter) = self.reporter.take() {
            if let Err(err) = reporter.await {
                tracing::warn!(error = %err, "metrics reporter join failed");
            }
        }
        self.workers_done = None;

        let stats = self.queue.stats().await;
        tracing::info!(
            pending = stats.pending,
            in_flight = stats.in_flight,
            done = stats.done,
            failed = stats.failed,
            "runner stopped"
        );
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is
    /// cancelled elsewhere, or every worker has exited.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let mut workers_done = self.workers_done.clone();
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
            _ = wait_all_done(workers_done.as_mut()) => {
                tracing::warn!("every worker has exited; shutting down runner");
            }
        }

        self.stop().await
    }

    /// Runs until the queue holds no pending or in-flight tasks, then stops.
    /// Also returns early on Ctrl-C, cancellation, or when no worker is left.
    pub async fn run_until_drained(&mut self) -> Result<QueueStats> {
        self.start().await?;

        let mut workers_done = self.workers_done.clone();
        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; shutting down runner");
                    break;
                }
                _ = self.shutdown.cancelled() => break,
                _ = wait_all_done(workers_done.as_mut()) => {
                    tracing::warn!("every worker has exited before the queue drained");
                    break;
                }
                _ = ticker.tick() => {
                    if self.queue.stats().await.is_drained() {
                        tracing::info!("queue drained");
                        break;
                    }
                }
            }
        }

        self.stop().await?;
        Ok(self.queue.stats().await)
    }
}

/// Resolves once the pool reports that every worker has exited. Never
/// resolves when no pool is running.
async fn wait_all_done(rx: Option<&mut watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if rx.wait_for(|done| *done).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

fn lookup_sessions(
    config: &ExtractorConfig,
    api: &Arc<dyn UpstreamApi>,
    telemetry: &Arc<Telemetry>,
    shutdown: &CancellationToken,
) -> Result<Vec<CredentialSession>> {
    let keys = if config.lookup_keys().is_empty() {
        tracing::warn!("no lookup keys configured; identity lookups reuse the worker keys");
        config.api_keys()
    } else {
        config.lookup_keys()
    };

    let registry = Arc::new(CredentialRegistry::default());
    keys.iter()
        .enumerate()
        .map(|(idx, secret)| {
            let credential = Credential::new(
                format!("lookup-{}", idx + 1),
                secret.as_str(),
                config.rate_windows().to_vec(),
                config.cooldown(),
            )?;
            Ok(CredentialSession::new(
                credential,
                api.clone(),
                registry.clone(),
                config.retry(),
                telemetry.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}
