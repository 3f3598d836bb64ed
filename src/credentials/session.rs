//! Guarded upstream calls for one credential.
//!
//! Every call waits on the credential's limiter first. Rate-limit signals put
//! the credential into cool-down and surface to the caller; rejected
//! credentials are marked dead in the shared registry; transient failures are
//! retried under the uniform [`RetryPolicy`].

use crate::api::{ApiToken, UpstreamApi};
use crate::credentials::{Credential, CredentialId, CredentialRegistry};
use crate::error::ExtractError;
use crate::processor::backoff::{sleep_with_cancellation, RetryPolicy};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct CredentialSession {
    credential: Credential,
    api: Arc<dyn UpstreamApi>,
    registry: Arc<CredentialRegistry>,
    retry: RetryPolicy,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CredentialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSession")
            .field("credential", &self.credential)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CredentialSession {
    pub fn new(
        credential: Credential,
        api: Arc<dyn UpstreamApi>,
        registry: Arc<CredentialRegistry>,
        retry: RetryPolicy,
        telemetry: Arc<Telemetry>,
        cancel: CancellationToken,
    ) -> Self {
        registry.register(credential.id().clone());
        Self {
            credential,
            api,
            registry,
            retry,
            telemetry,
            cancel,
        }
    }

    pub fn id(&self) -> &CredentialId {
        self.credential.id()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn registry(&self) -> &Arc<CredentialRegistry> {
        &self.registry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_alive(&self) -> bool {
        self.registry.is_alive(self.credential.id())
    }

    pub fn is_cooling_down(&self) -> bool {
        self.credential.limiter().is_cooling_down()
    }

    pub async fn wait_cooldown(&self) -> Result<()> {
        self.credential.limiter().wait_cooldown(&self.cancel).await
    }

    /// Runs `op` against the upstream API under this credential's budget.
    pub async fn call<T, F, Fut>(&mut self, endpoint: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn UpstreamApi>, ApiToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;

            if !self.is_alive() {
                return Err(ExtractError::CredentialDead {
                    credential: self.credential.id().to_string(),
                }
                .into());
            }

            self.credential
                .limiter_mut()
                .until_ready(1, &self.cancel)
                .await?;

            let err = match op(self.api.clone(), self.credential.token().clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match ExtractError::classify(&err).cloned() {
                Some(ExtractError::RateLimited { retry_after, .. }) => {
                    let applied = self.credential.limiter_mut().enter_cooldown(retry_after);
                    self.telemetry.record_rate_limited();
                    tracing::warn!(
                        credential = %self.credential.id(),
                        endpoint,
                        cooldown_secs = applied.as_secs(),
                        "credential rate limited; entering cool-down"
                    );
                    return Err(err);
                }
                Some(ExtractError::CredentialDead { .. }) => {
                    if self.registry.mark_dead(self.credential.id()) {
                        self.telemetry.record_dead_credential();
                        tracing::error!(
                            credential = %self.credential.id(),
                            endpoint,
                            "credential rejected by upstream; removing from routing"
                        );
                    }
                    return Err(err);
                }
                Some(ExtractError::TransientUpstreamFailure { .. }) => {
                    self.telemetry.record_transient_failure();
                    if self.retry.exhausted(attempt) {
                        tracing::warn!(
                            credential = %self.credential.id(),
                            endpoint,
                            attempt,
                            error = %err,
                            "transient failure retries exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.retry.delay_for(attempt);
                    tracing::warn!(
                        credential = %self.credential.id(),
                        endpoint,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient upstream failure; retrying"
                    );
                    sleep_with_cancellation(backoff, &self.cancel).await?;
                }
                _ => return Err(err),
            }
        }
    }
}
