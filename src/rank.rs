//! Rank discovery for a resolved subject.
//!
//! The per-summoner endpoint hides top-tier players, so resolution falls
//! through three strategies in strict order: direct lookup, summoner id
//! recovery from match participants, and a sweep of the paginated top-tier
//! listing. Running out of strategies yields [`RankOutcome::Unranked`].

pub mod chain;
pub mod strategies;

pub use chain::{RankReport, RankResolver};
pub use strategies::{DirectLookup, MatchRecovery, SweepOptions, TierSweep};

use crate::api::LeagueEntry;
use crate::credentials::CredentialSession;
use crate::identity::ResolutionMethod;
use crate::routing::Region;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
pub const FLEX_QUEUE: &str = "RANKED_FLEX_SR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankOutcome {
    Ranked {
        entry: LeagueEntry,
        method: ResolutionMethod,
    },
    Unranked,
}

impl RankOutcome {
    pub fn is_ranked(&self) -> bool {
        matches!(self, RankOutcome::Ranked { .. })
    }

    pub fn method(&self) -> Option<ResolutionMethod> {
        match self {
            RankOutcome::Ranked { method, .. } => Some(*method),
            RankOutcome::Unranked => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    DirectLookup,
    MatchRecovery,
    TierSweep,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyKind::DirectLookup => "direct_lookup",
            StrategyKind::MatchRecovery => "match_recovery",
            StrategyKind::TierSweep => "tier_sweep",
        };
        f.write_str(label)
    }
}

/// What a strategy knows about the subject in the current credential's
/// namespace.
#[derive(Debug, Clone)]
pub struct RankContext {
    pub region: Region,
    pub puuid: String,
    pub summoner_id: Option<String>,
    /// How `puuid` and `summoner_id` were obtained.
    pub identity_method: ResolutionMethod,
    /// Match payloads already at hand (this batch plus stored records).
    pub payloads: Vec<Value>,
}

/// A hit from one strategy, with the summoner id it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankFound {
    pub entry: LeagueEntry,
    pub summoner_id: Option<String>,
    pub method: ResolutionMethod,
}

pub trait RankStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// `Ok(None)` hands over to the next strategy.
    fn resolve<'a>(
        &'a self,
        session: &'a mut CredentialSession,
        ctx: &'a RankContext,
    ) -> BoxFuture<'a, Result<Option<RankFound>>>;
}

/// Solo queue first, otherwise whatever the upstream listed first.
pub fn preferred_entry(entries: &[LeagueEntry]) -> Option<&LeagueEntry> {
    entries
        .iter()
        .find(|entry| entry.queue_type == SOLO_QUEUE)
        .or_else(|| entries.first())
}
