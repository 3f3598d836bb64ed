use crate::api::options::DEFAULT_BASE_URL_TEMPLATE;
use crate::credentials::{RateWindow, DEFAULT_COOLDOWN};
use crate::processor::backoff::RetryPolicy;
use crate::queue::memory::DEFAULT_CLAIM_TIMEOUT;
use crate::rank::SweepOptions;
use crate::routing::{Region, RegionRouter};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_HISTORY_DEPTH: u32 = 200;
pub const DEFAULT_REFRESH_DEPTH: u32 = 100;
pub const DEFAULT_TASK_RETRY_CEILING: u32 = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration for the extraction subsystem.
///
/// All instances must be constructed via [`ExtractorConfig::builder`],
/// [`ExtractorConfig::new`], or [`ExtractorConfig::from_env`] so invariants are
/// validated before any consumer observes the values.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    api_keys: Vec<String>,
    lookup_keys: Vec<String>,
    batch_size: u32,
    history_depth: u32,
    refresh_depth: u32,
    rate_windows: Vec<RateWindow>,
    cooldown: Duration,
    poll_interval: Duration,
    claim_timeout: Duration,
    retry: RetryPolicy,
    task_retry_ceiling: u32,
    request_timeout: Duration,
    api_base_url: String,
    region_fallback: Option<Region>,
    sweep: SweepOptions,
    metrics_interval: Duration,
}

pub struct ExtractorConfigParams {
    pub api_keys: Vec<String>,
    pub lookup_keys: Vec<String>,
    pub batch_size: u32,
    pub history_depth: u32,
    pub refresh_depth: u32,
    pub rate_windows: Vec<RateWindow>,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    pub claim_timeout: Duration,
    pub retry: RetryPolicy,
    pub task_retry_ceiling: u32,
    pub request_timeout: Duration,
    pub api_base_url: String,
    pub region_fallback: Option<Region>,
    pub sweep: SweepOptions,
    pub metrics_interval: Duration,
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("api_keys", &format_args!("<{} redacted>", self.api_keys.len()))
            .field(
                "lookup_keys",
                &format_args!("<{} redacted>", self.lookup_keys.len()),
            )
            .field("batch_size", &self.batch_size)
            .field("history_depth", &self.history_depth)
            .field("refresh_depth", &self.refresh_depth)
            .field("rate_windows", &self.rate_windows)
            .field("cooldown", &self.cooldown)
            .field("poll_interval", &self.poll_interval)
            .field("claim_timeout", &self.claim_timeout)
            .field("retry", &self.retry)
            .field("task_retry_ceiling", &self.task_retry_ceiling)
            .field("request_timeout", &self.request_timeout)
            .field("api_base_url", &self.api_base_url)
            .field("region_fallback", &self.region_fallback)
            .field("sweep", &self.sweep)
            .field("metrics_interval", &self.metrics_interval)
            .finish()
    }
}

impl ExtractorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ExtractorConfigParams) -> Result<Self> {
        let ExtractorConfigParams {
            api_keys,
            lookup_keys,
            batch_size,
            history_depth,
            refresh_depth,
            rate_windows,
            cooldown,
            poll_interval,
            claim_timeout,
            retry,
            task_retry_ceiling,
            request_timeout,
            api_base_url,
            region_fallback,
            sweep,
            metrics_interval,
        } = params;

        let config = Self {
            api_keys: trimmed_keys(api_keys),
            lookup_keys: trimmed_keys(lookup_keys),
            batch_size,
            history_depth,
            refresh_depth,
            rate_windows,
            cooldown,
            poll_interval,
            claim_timeout,
            retry,
            task_retry_ceiling,
            request_timeout,
            api_base_url: api_base_url.trim().to_owned(),
            region_fallback,
            sweep,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Loads `.env` (when present) and reads `MATCHPULL_*` variables.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = Self::builder();
        match var("MATCHPULL_API_KEYS").or_else(|| var("RIOT_API_KEY")) {
            Some(keys) => builder = builder.api_keys(split_keys(&keys)),
            None => bail!("MATCHPULL_API_KEYS (or RIOT_API_KEY) must be set"),
        }
        if let Some(keys) = var("MATCHPULL_LOOKUP_KEYS") {
            builder = builder.lookup_keys(split_keys(&keys));
        }
        if let Some(value) = var("MATCHPULL_BATCH_SIZE") {
            builder = builder.batch_size(parse_var("MATCHPULL_BATCH_SIZE", &value)?);
        }
        if let Some(value) = var("MATCHPULL_HISTORY_DEPTH") {
            builder = builder.history_depth(parse_var("MATCHPULL_HISTORY_DEPTH", &value)?);
        }
        if let Some(value) = var("MATCHPULL_COOLDOWN_SECS") {
            let secs: u64 = parse_var("MATCHPULL_COOLDOWN_SECS", &value)?;
            builder = builder.cooldown(Duration::from_secs(secs));
        }
        if let Some(value) = var("MATCHPULL_POLL_INTERVAL_MS") {
            let millis: u64 = parse_var("MATCHPULL_POLL_INTERVAL_MS", &value)?;
            builder = builder.poll_interval(Duration::from_millis(millis));
        }
        if let Some(value) = var("MATCHPULL_TASK_RETRY_CEILING") {
            builder =
                builder.task_retry_ceiling(parse_var("MATCHPULL_TASK_RETRY_CEILING", &value)?);
        }
        if let Some(value) = var("MATCHPULL_REGION_FALLBACK") {
            builder = builder.region_fallback(parse_var("MATCHPULL_REGION_FALLBACK", &value)?);
        }
        if let Some(value) = var("MATCHPULL_API_BASE_URL") {
            builder = builder.api_base_url(value);
        }
        if let Some(value) = var("MATCHPULL_SWEEP_MAX_PAGES") {
            builder = builder.sweep_max_pages(parse_var("MATCHPULL_SWEEP_MAX_PAGES", &value)?);
        }

        builder.build()
    }

    /// Secrets for the worker credentials, one worker each.
    pub fn api_keys(&self) -> &[String] {
        &self.api_keys
    }

    /// Secrets reserved for identity lookups at enqueue time. Empty means the
    /// worker keys are reused.
    pub fn lookup_keys(&self) -> &[String] {
        &self.lookup_keys
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn history_depth(&self) -> u32 {
        self.history_depth
    }

    pub fn refresh_depth(&self) -> u32 {
        self.refresh_depth
    }

    pub fn rate_windows(&self) -> &[RateWindow] {
        &self.rate_windows
    }

    /// Fixed recovery interval used when a rate-limit signal carries no hint.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn claim_timeout(&self) -> Duration {
        self.claim_timeout
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn task_retry_ceiling(&self) -> u32 {
        self.task_retry_ceiling
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn region_fallback(&self) -> Option<Region> {
        self.region_fallback
    }

    pub fn router(&self) -> RegionRouter {
        match self.region_fallback {
            Some(region) => RegionRouter::with_fallback(region),
            None => RegionRouter::strict(),
        }
    }

    pub fn sweep(&self) -> &SweepOptions {
        &self.sweep
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.api_keys.is_empty() {
            bail!("api_keys must contain at least one key");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.rate_windows.is_empty() {
            bail!("rate_windows must contain at least one window");
        }

        for window in &self.rate_windows {
            if window.limit == 0 || window.period.is_zero() {
                bail!("rate_windows entries must have a non-zero limit and period");
            }
        }

        if self.cooldown.is_zero() {
            bail!("cooldown must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.claim_timeout.is_zero() {
            bail!("claim_timeout must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            bail!("retry max_attempts must be greater than 0");
        }

        if self.task_retry_ceiling == 0 {
            bail!("task_retry_ceiling must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        let base = self.api_base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("api_base_url must start with http:// or https://");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExtractorConfigBuilder {
    api_keys: Option<Vec<String>>,
    lookup_keys: Option<Vec<String>>,
    batch_size: Option<u32>,
    history_depth: Option<u32>,
    refresh_depth: Option<u32>,
    rate_windows: Option<Vec<RateWindow>>,
    cooldown: Option<Duration>,
    poll_interval: Option<Duration>,
    claim_timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    task_retry_ceiling: Option<u32>,
    request_timeout: Option<Duration>,
    api_base_url: Option<String>,
    region_fallback: Option<Region>,
    sweep: Option<SweepOptions>,
    sweep_max_pages: Option<u32>,
    metrics_interval: Option<Duration>,
}

impl ExtractorConfigBuilder {
    pub fn api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn lookup_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lookup_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn history_depth(mut self, depth: u32) -> Self {
        self.history_depth = Some(depth);
        self
    }

    pub fn refresh_depth(mut self, depth: u32) -> Self {
        self.refresh_depth = Some(depth);
        self
    }

    pub fn rate_windows(mut self, windows: Vec<RateWindow>) -> Self {
        self.rate_windows = Some(windows);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn task_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.task_retry_ceiling = Some(ceiling);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn region_fallback(mut self, region: Region) -> Self {
        self.region_fallback = Some(region);
        self
    }

    pub fn sweep(mut self, sweep: SweepOptions) -> Self {
        self.sweep = Some(sweep);
        self
    }

    pub fn sweep_max_pages(mut self, pages: u32) -> Self {
        self.sweep_max_pages = Some(pages);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ExtractorConfig> {
        let mut sweep = self.sweep.unwrap_or_default();
        if let Some(pages) = self.sweep_max_pages {
            sweep.max_pages = pages;
        }

        let params = ExtractorConfigParams {
            api_keys: self.api_keys.context("api_keys is required")?,
            lookup_keys: self.lookup_keys.unwrap_or_default(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            history_depth: self.history_depth.unwrap_or(DEFAULT_HISTORY_DEPTH),
            refresh_depth: self.refresh_depth.unwrap_or(DEFAULT_REFRESH_DEPTH),
            rate_windows: self
                .rate_windows
                .unwrap_or_else(RateWindow::development_defaults),
            cooldown: self.cooldown.unwrap_or(DEFAULT_COOLDOWN),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            claim_timeout: self.claim_timeout.unwrap_or(DEFAULT_CLAIM_TIMEOUT),
            retry: self.retry.unwrap_or_default(),
            task_retry_ceiling: self
                .task_retry_ceiling
                .unwrap_or(DEFAULT_TASK_RETRY_CEILING),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL_TEMPLATE.to_owned()),
            region_fallback: self.region_fallback,
            sweep,
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        ExtractorConfig::new(params)
    }
}

fn trimmed_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .map(|key| key.trim().to_owned())
        .filter(|key| !key.is_empty())
        .collect()
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_owned).collect()
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| anyhow::anyhow!("{name} has invalid value {raw:?}: {err}"))
}
