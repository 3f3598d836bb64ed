//! Upstream data API plumbing: the `UpstreamApi` seam consumed by workers, the
//! `reqwest` implementation, wire types, options, and request metrics.

pub mod client;
pub mod metrics;
#[cfg(test)]
pub(crate) mod mock;
pub mod options;
pub mod types;

pub use client::{classify_status, HttpApiClient, UpstreamApi};
pub use metrics::ApiMetricsSnapshot;
pub use options::ApiClientOptions;
pub use types::{Account, ApiToken, LeagueEntry, Summoner};
