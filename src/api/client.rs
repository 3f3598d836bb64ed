//! Upstream client implementation and the `UpstreamApi` trait consumed by
//! workers, the orchestrator's subject directory, and the rank strategies.
//!
//! Every response is mapped onto the shared signal contract: not found, rate
//! limited, credential rejected, namespace mismatch, transient, or a plain
//! non-retryable error.

use crate::api::metrics::{ApiMetrics, ApiMetricsSnapshot};
use crate::api::options::ApiClientOptions;
use crate::api::types::{Account, ApiToken, LeagueEntry, Summoner};
use crate::error::ExtractError;
use crate::routing::Region;
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TOKEN_HEADER: &str = "X-Riot-Token";

pub trait UpstreamApi: Send + Sync {
    /// Identity lookup: riot id to puuid in `token`'s namespace.
    fn account_by_riot_id<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> BoxFuture<'a, Result<Account>>;

    fn summoner_by_puuid<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        puuid: &'a str,
    ) -> BoxFuture<'a, Result<Summoner>>;

    fn match_ids<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        puuid: &'a str,
        start: u32,
        count: u32,
    ) -> BoxFuture<'a, Result<Vec<String>>>;

    fn match_detail<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        match_id: &'a str,
    ) -> BoxFuture<'a, Result<Value>>;

    fn league_entries<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        summoner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>>;

    /// One page of the top-tier league listing.
    fn league_page<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        queue: &'a str,
        tier: &'a str,
        division: &'a str,
        page: u32,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>>;
}

#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    options: ApiClientOptions,
    metrics: Arc<ApiMetrics>,
}

impl HttpApiClient {
    pub fn new() -> Result<Self> {
        Self::with_options(ApiClientOptions::default())
    }

    pub fn with_options(options: ApiClientOptions) -> Result<Self> {
        options.validate()?;

        let client = Client::builder()
            .timeout(options.request_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            options,
            metrics: Arc::new(ApiMetrics::default()),
        })
    }

    pub fn metrics(&self) -> ApiMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn endpoint_url(&self, host: &str, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let base = self.options.base_url_for(host);
        let mut url = Url::parse(&base).with_context(|| format!("invalid base url {base}"))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url {base} cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T>(&self, endpoint: &'static str, token: &ApiToken, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let response = match self
            .client
            .get(url)
            .header(TOKEN_HEADER, token.expose())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.metrics.record_failure(start.elapsed());
                return Err(map_transport_error(endpoint, err));
            }
        };

        let status = response.status();
        if status.is_success() {
            self.metrics.record_success(start.elapsed());
            return response
                .json::<T>()
                .await
                .with_context(|| format!("failed to decode {endpoint} response"));
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.metrics.record_rate_limited(start.elapsed());
        } else {
            self.metrics.record_failure(start.elapsed());
        }

        tracing::debug!(
            endpoint,
            credential = token.label(),
            status = status.as_u16(),
            "upstream call returned non-success status"
        );

        Err(classify_status(
            endpoint,
            status.as_u16(),
            &body,
            retry_after,
            token,
        ))
    }
}

impl UpstreamApi for HttpApiClient {
    fn account_by_riot_id<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> BoxFuture<'a, Result<Account>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.cluster(),
                &[
                    "riot", "account", "v1", "accounts", "by-riot-id", game_name, tag_line,
                ],
                &[],
            )?;
            self.get_json("account_by_riot_id", token, url).await
        })
    }

    fn summoner_by_puuid<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        puuid: &'a str,
    ) -> BoxFuture<'a, Result<Summoner>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.platform(),
                &["lol", "summoner", "v4", "summoners", "by-puuid", puuid],
                &[],
            )?;
            self.get_json("summoner_by_puuid", token, url).await
        })
    }

    fn match_ids<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        puuid: &'a str,
        start: u32,
        count: u32,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.cluster(),
                &["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"],
                &[("start", start.to_string()), ("count", count.to_string())],
            )?;
            self.get_json("match_ids", token, url).await
        })
    }

    fn match_detail<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        match_id: &'a str,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.cluster(),
                &["lol", "match", "v5", "matches", match_id],
                &[],
            )?;
            self.get_json("match_detail", token, url).await
        })
    }

    fn league_entries<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        summoner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.platform(),
                &["lol", "league", "v4", "entries", "by-summoner", summoner_id],
                &[],
            )?;
            self.get_json("league_entries", token, url).await
        })
    }

    fn league_page<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        queue: &'a str,
        tier: &'a str,
        division: &'a str,
        page: u32,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>> {
        Box::pin(async move {
            let url = self.endpoint_url(
                region.platform(),
                &["lol", "league-exp", "v4", "entries", queue, tier, division],
                &[("page", page.to_string())],
            )?;
            self.get_json("league_page", token, url).await
        })
    }
}

/// Maps a non-success status onto the signal contract.
pub fn classify_status(
    endpoint: &'static str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
    token: &ApiToken,
) -> anyhow::Error {
    match status {
        404 => ExtractError::NotFound { endpoint }.into(),
        429 => ExtractError::RateLimited {
            endpoint,
            retry_after,
        }
        .into(),
        401 | 403 => ExtractError::CredentialDead {
            credential: token.label().to_owned(),
        }
        .into(),
        400 if body.to_ascii_lowercase().contains("decrypt") => {
            ExtractError::IdentityNamespaceMismatch { endpoint }.into()
        }
        500..=599 => ExtractError::TransientUpstreamFailure {
            endpoint,
            detail: format!("status {status}"),
        }
        .into(),
        _ => anyhow!("{endpoint} failed with status {status}: {body}"),
    }
}

fn map_transport_error(endpoint: &'static str, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        let detail = if err.is_timeout() {
            "request timed out".to_owned()
        } else {
            err.to_string()
        };
        return ExtractError::TransientUpstreamFailure { endpoint, detail }.into();
    }
    anyhow!("{endpoint} request failed: {err}")
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
