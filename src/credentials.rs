//! Credential pool: per-credential rate limiting, shared liveness, and the
//! guarded call session every upstream request goes through.

pub mod limiter;
pub mod registry;
pub mod session;

pub use limiter::{Acquire, RateLimiter, RateWindow, DEFAULT_COOLDOWN};
pub use registry::{CredentialRegistry, Liveness};
pub use session::CredentialSession;

use crate::api::ApiToken;
use crate::routing::Region;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One API key together with the limiter guarding it. Owned by exactly one
/// consumer; never shared between workers.
#[derive(Debug)]
pub struct Credential {
    id: CredentialId,
    token: ApiToken,
    scope: Option<Vec<Region>>,
    limiter: RateLimiter,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        windows: Vec<RateWindow>,
        cooldown: Duration,
    ) -> Result<Self> {
        let id = CredentialId::new(id);
        let token = ApiToken::new(id.as_str(), secret);
        Ok(Self {
            id,
            token,
            scope: None,
            limiter: RateLimiter::new(windows, cooldown)?,
        })
    }

    /// Restricts the regions this credential serves.
    pub fn with_scope(mut self, regions: Vec<Region>) -> Self {
        self.scope = if regions.is_empty() {
            None
        } else {
            Some(regions)
        };
        self
    }

    pub fn id(&self) -> &CredentialId {
        &self.id
    }

    pub fn token(&self) -> &ApiToken {
        &self.token
    }

    pub fn scope(&self) -> Option<&[Region]> {
        self.scope.as_deref()
    }

    pub fn serves(&self, region: Region) -> bool {
        self.scope
            .as_ref()
            .map_or(true, |regions| regions.contains(&region))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }
}
