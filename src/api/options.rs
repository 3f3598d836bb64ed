//! Knobs for the upstream HTTP client along with validation so callers can
//! reason about timeouts and endpoint layout before any request is issued.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL_TEMPLATE: &str = "https://{host}.api.riotgames.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_IDLE_PER_HOST: usize = 8;

#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    pub request_timeout: Duration,
    /// Base URL; `{host}` is replaced by the cluster or platform routing value.
    pub base_url_template: String,
    pub pool_max_idle_per_host: usize,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            base_url_template: DEFAULT_BASE_URL_TEMPLATE.to_owned(),
            pool_max_idle_per_host: DEFAULT_POOL_IDLE_PER_HOST,
        }
    }
}

impl ApiClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        let base = self.base_url_template.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("base_url_template must start with http:// or https://");
        }
        Ok(())
    }

    pub(crate) fn base_url_for(&self, host: &str) -> String {
        self.base_url_template
            .trim()
            .trim_end_matches('/')
            .replace("{host}", host)
    }
}
