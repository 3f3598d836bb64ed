//! Error taxonomy shared by the orchestrator, the credential session, and the
//! extraction workers.
//!
//! Functions across the crate return `anyhow::Result`; the variants below travel
//! inside `anyhow::Error` and are recovered with [`ExtractError::classify`] so a
//! caller can decide between cool-down, re-resolution, retry, or failure.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("subject {subject} cannot be resolved by any credential")]
    InvalidSubject { subject: String },

    #[error("tag suffix {tag:?} does not map to a known region")]
    RegionUnresolvable { tag: String },

    #[error("upstream rate limit hit on {endpoint}")]
    RateLimited {
        endpoint: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("identity is not valid in this credential's namespace ({endpoint})")]
    IdentityNamespaceMismatch { endpoint: &'static str },

    #[error("{endpoint} returned not found")]
    NotFound { endpoint: &'static str },

    #[error("transient upstream failure on {endpoint}: {detail}")]
    TransientUpstreamFailure {
        endpoint: &'static str,
        detail: String,
    },

    #[error("credential {credential} was rejected by the upstream API")]
    CredentialDead { credential: String },

    #[error("task {task} exceeded {attempts} attempts")]
    TaskRetryExceeded { task: u64, attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Returns the typed condition carried by `err`, if any.
    pub fn classify(err: &anyhow::Error) -> Option<&ExtractError> {
        err.downcast_ref::<ExtractError>()
    }

    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::classify(err), Some(ExtractError::NotFound { .. }))
    }

    pub fn is_rate_limited(err: &anyhow::Error) -> bool {
        matches!(Self::classify(err), Some(ExtractError::RateLimited { .. }))
    }

    pub fn is_transient(err: &anyhow::Error) -> bool {
        matches!(
            Self::classify(err),
            Some(ExtractError::TransientUpstreamFailure { .. })
        )
    }

    pub fn is_credential_dead(err: &anyhow::Error) -> bool {
        matches!(Self::classify(err), Some(ExtractError::CredentialDead { .. }))
    }

    pub fn is_namespace_mismatch(err: &anyhow::Error) -> bool {
        matches!(
            Self::classify(err),
            Some(ExtractError::IdentityNamespaceMismatch { .. })
        )
    }

    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(Self::classify(err), Some(ExtractError::Cancelled))
    }

    /// True for conditions that stop all further work on the current
    /// credential: rate limiting, rejection, and shutdown.
    pub fn interrupts_credential(err: &anyhow::Error) -> bool {
        matches!(
            Self::classify(err),
            Some(
                ExtractError::RateLimited { .. }
                    | ExtractError::CredentialDead { .. }
                    | ExtractError::Cancelled
            )
        )
    }
}
