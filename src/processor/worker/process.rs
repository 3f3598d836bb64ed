use crate::credentials::{CredentialId, CredentialSession};
use crate::error::ExtractError;
use crate::identity::{self, IdentityCache, IdentityMapping};
use crate::queue::{Consumer, NackDisposition, Settlement, Task, TaskId, TaskQueue};
use crate::rank::{RankContext, RankResolver};
use crate::runtime::telemetry::Telemetry;
use crate::store::{DocumentStore, RawRecord, SubjectProfile, UpsertOutcome};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;

use super::shared::WorkerShared;
use super::types::{TaskProgress, WorkerExit, MAX_RECOVERY_PAYLOADS};

/// One extraction loop bound to exactly one credential.
pub struct Worker {
    pub id: usize,
    pub(super) session: CredentialSession,
    pub(super) cache: IdentityCache,
    pub(super) consumer: Consumer,
    pub(super) queue: Arc<dyn TaskQueue>,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) rank: Arc<RankResolver>,
    pub(super) poll_interval: Duration,
    pub(super) task_retry_ceiling: u32,
}

impl Worker {
    pub fn new(id: usize, session: CredentialSession, shared: WorkerShared) -> Self {
        let WorkerShared {
            queue,
            store,
            registry,
            telemetry,
            rank,
            poll_interval,
            task_retry_ceiling,
        } = shared;

        let consumer = Consumer::new(
            session.id().clone(),
            session.credential().scope().map(|regions| regions.to_vec()),
            registry,
        );

        Self {
            id,
            session,
            cache: IdentityCache::default(),
            consumer,
            queue,
            store,
            telemetry,
            rank,
            poll_interval,
            task_retry_ceiling,
        }
    }

    pub fn credential(&self) -> &CredentialId {
        self.session.id()
    }

    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id, credential = %self.session.id()))]
    pub async fn run(mut self) -> Result<WorkerExit> {
        tracing::info!(worker = self.id, "worker task started");
        let cancel = self.session.cancellation().clone();

        loop {
            if cancel.is_cancelled() {
                tracing::info!(worker = self.id, "shutdown requested; exiting worker loop");
                return Ok(WorkerExit::Cancelled);
            }

            if !self.session.is_alive() {
                tracing::error!(worker = self.id, "credential is dead; worker exiting");
                self.release_claims().await;
                return Ok(WorkerExit::CredentialDead);
            }

            if self.session.is_cooling_down() {
                tracing::debug!(worker = self.id, "credential cooling down before next claim");
                match self.session.wait_cooldown().await {
                    Ok(()) => {}
                    Err(err) if ExtractError::is_cancelled(&err) => {}
                    Err(err) => return Err(err),
                }
                continue;
            }

            let claimed = select! {
                _ = cancel.cancelled() => continue,
                claimed = self.queue.dequeue(&self.consumer, self.poll_interval) => claimed?,
            };
            let Some(task) = claimed else {
                continue;
            };

            if let Some(exit) = self.handle_task(task).await? {
                return Ok(exit);
            }
        }
    }

    /// Processes one claimed task and settles it with the queue. Returns an
    /// exit reason when the worker must stop.
    pub(super) async fn handle_task(&mut self, mut task: Task) -> Result<Option<WorkerExit>> {
        tracing::debug!(
            worker = self.id,
            task = %task.id,
            subject = %task.subject,
            offset = task.offset,
            count = task.count,
            "task claimed"
        );

        let mut progress = TaskProgress::default();
        let err = match self.process_task(&task, &mut progress).await {
            Ok(()) => {
                self.complete(task.id).await?;
                tracing::debug!(
                    worker = self.id,
                    task = %task.id,
                    inserted = progress.inserted,
                    duplicates = progress.duplicates,
                    "task done"
                );
                return Ok(None);
            }
            Err(err) => err,
        };

        task.advance(progress.persisted);
        match ExtractError::classify(&err).cloned() {
            Some(ExtractError::NotFound { endpoint }) => {
                tracing::info!(
                    worker = self.id,
                    task = %task.id,
                    subject = %task.subject,
                    endpoint,
                    "subject not found upstream; completing with no records"
                );
                self.complete(task.id).await?;
                Ok(None)
            }
            Some(ExtractError::RateLimited { .. }) => {
                tracing::warn!(
                    worker = self.id,
                    task = %task.id,
                    offset = task.offset,
                    "rate limited mid-task; re-queueing remainder"
                );
                task.affinity = None;
                self.requeue(task).await?;
                Ok(None)
            }
            Some(ExtractError::CredentialDead { .. }) => {
                tracing::error!(
                    worker = self.id,
                    task = %task.id,
                    "credential rejected; handing task to surviving credentials"
                );
                task.affinity = None;
                self.requeue(task).await?;
                self.release_claims().await;
                Ok(Some(WorkerExit::CredentialDead))
            }
            Some(ExtractError::Cancelled) => {
                task.affinity = None;
                self.requeue(task).await?;
                Ok(Some(WorkerExit::Cancelled))
            }
            Some(ExtractError::IdentityNamespaceMismatch { .. }) => {
                if self.cache.invalidate(&task.subject.puuid).is_some() {
                    tracing::warn!(
                        worker = self.id,
                        subject = %task.subject,
                        "cached identity rejected upstream; invalidated"
                    );
                }
                task.affinity = None;
                self.retry_or_fail(task, &err).await?;
                Ok(None)
            }
            _ => {
                task.affinity = Some(self.session.id().clone());
                self.retry_or_fail(task, &err).await?;
                Ok(None)
            }
        }
    }

    async fn process_task(&mut self, task: &Task, progress: &mut TaskProgress) -> Result<()> {
        let region = task.region;
        let resolved =
            identity::resolve(&mut self.session, &mut self.cache, &task.subject, region).await?;
        let mapping = resolved.mapping;

        if task.count > 0 {
            let (puuid, start, count) = (mapping.puuid.as_str(), task.offset, task.count);
            let match_ids = self
                .session
                .call("match_ids", move |api, token| async move {
                    api.match_ids(&token, region, puuid, start, count).await
                })
                .await?;

            for match_id in &match_ids {
                self.store_match(task, &mapping, match_id, progress).await?;
                progress.persisted += 1;
            }
        }

        if task.refresh_profile {
            if let Err(err) = self.refresh_profile(task, &mapping, progress).await {
                if ExtractError::interrupts_credential(&err) {
                    return Err(err);
                }
                tracing::warn!(
                    worker = self.id,
                    subject = %task.subject,
                    error = %err,
                    "profile refresh failed; keeping extracted records"
                );
            }
        }

        Ok(())
    }

    async fn store_match(
        &mut self,
        task: &Task,
        mapping: &IdentityMapping,
        match_id: &str,
        progress: &mut TaskProgress,
    ) -> Result<()> {
        if self.store.contains_record(match_id).await? {
            progress.duplicates += 1;
            self.telemetry.record_duplicates(1);
            return Ok(());
        }

        let region = task.region;
        let payload = match self
            .session
            .call("match_detail", move |api, token| async move {
                api.match_detail(&token, region, match_id).await
            })
            .await
        {
            Ok(payload) => payload,
            Err(err) if ExtractError::is_not_found(&err) => {
                tracing::debug!(worker = self.id, match_id, "match missing upstream; skipped");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if task.refresh_profile {
            progress.keep_payload(&payload);
        }

        let record = RawRecord::new(
            match_id.to_owned(),
            task.subject.puuid.clone(),
            mapping.puuid.clone(),
            payload,
        );
        match self.store.upsert_record(record).await? {
            UpsertOutcome::Inserted => {
                progress.inserted += 1;
                self.telemetry.record_inserted(1);
            }
            UpsertOutcome::Duplicate => {
                progress.duplicates += 1;
                self.telemetry.record_duplicates(1);
            }
        }
        Ok(())
    }

    async fn refresh_profile(
        &mut self,
        task: &Task,
        mapping: &IdentityMapping,
        progress: &mut TaskProgress,
    ) -> Result<()> {
        let mut payloads = std::mem::take(&mut progress.payloads);
        if payloads.is_empty() {
            payloads = self
                .store
                .records_for_subject(&task.subject.puuid)
                .await?
                .into_iter()
                .filter(|record| record.puuid == mapping.puuid)
                .take(MAX_RECOVERY_PAYLOADS)
                .map(|record| record.payload)
                .collect();
        }

        let ctx = RankContext {
            region: task.region,
            puuid: mapping.puuid.clone(),
            summoner_id: mapping.summoner_id.clone(),
            identity_method: mapping.method,
            payloads,
        };
        let report = self.rank.resolve(&mut self.session, &ctx).await?;

        if let (Some(summoner_id), Some(method)) = (&report.summoner_id, report.outcome.method()) {
            if mapping.summoner_id.as_deref() != Some(summoner_id.as_str()) {
                self.cache
                    .enrich(&task.subject.puuid, summoner_id.clone(), method);
            }
        }

        tracing::debug!(
            worker = self.id,
            subject = %task.subject,
            ranked = report.outcome.is_ranked(),
            strategies = report.attempted.len(),
            "profile refreshed"
        );

        self.store
            .upsert_profile(SubjectProfile {
                subject: task.subject.clone(),
                region: task.region,
                rank_method: report.outcome.method(),
                rank: report.outcome,
                refreshed_at: Utc::now(),
            })
            .await
    }

    async fn complete(&self, id: TaskId) -> Result<()> {
        match self.queue.ack(&self.consumer, id).await? {
            Settlement::Settled => self.telemetry.record_task_done(),
            Settlement::ClaimLost => self.claim_lost(id),
        }
        Ok(())
    }

    async fn requeue(&self, task: Task) -> Result<()> {
        let id = task.id;
        match self
            .queue
            .nack(&self.consumer, task, NackDisposition::Requeue)
            .await?
        {
            Settlement::Settled => self.telemetry.record_task_requeued(),
            Settlement::ClaimLost => self.claim_lost(id),
        }
        Ok(())
    }

    /// The claim expired or was released while this worker held the task;
    /// whoever owns it now settles it.
    fn claim_lost(&self, id: TaskId) {
        tracing::warn!(
            worker = self.id,
            task = %id,
            "claim lost before the task settled; leaving it to the current owner"
        );
    }

    async fn retry_or_fail(&self, mut task: Task, err: &anyhow::Error) -> Result<()> {
        task.attempts += 1;

        if task.attempts >= self.task_retry_ceiling {
            let exceeded = ExtractError::TaskRetryExceeded {
                task: task.id.0,
                attempts: task.attempts,
            };
            tracing::error!(
                worker = self.id,
                task = %task.id,
                subject = %task.subject,
                error = %err,
                "{exceeded}"
            );
            task.last_error = Some(format!("{exceeded}: {err:#}"));
            let id = task.id;
            match self
                .queue
                .nack(&self.consumer, task, NackDisposition::Fail)
                .await?
            {
                Settlement::Settled => self.telemetry.record_task_failed(),
                Settlement::ClaimLost => self.claim_lost(id),
            }
            return Ok(());
        }

        tracing::warn!(
            worker = self.id,
            task = %task.id,
            attempts = task.attempts,
            error = %err,
            "task failed; re-queueing"
        );
        task.last_error = Some(format!("{err:#}"));
        self.requeue(task).await
    }

    async fn release_claims(&self) {
        match self.queue.release_claims(self.session.id()).await {
            Ok(0) => {}
            Ok(released) => {
                tracing::info!(worker = self.id, released, "released remaining claims");
            }
            Err(err) => {
                tracing::warn!(worker = self.id, error = %err, "failed to release claims");
            }
        }
    }
}
