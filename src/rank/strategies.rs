use crate::api::LeagueEntry;
use crate::credentials::CredentialSession;
use crate::error::ExtractError;
use crate::identity::ResolutionMethod;
use crate::rank::{
    preferred_entry, RankContext, RankFound, RankStrategy, StrategyKind, FLEX_QUEUE, SOLO_QUEUE,
};
use crate::routing::Region;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;

async fn entries_for(
    session: &mut CredentialSession,
    region: Region,
    summoner_id: &str,
) -> Result<Vec<LeagueEntry>> {
    match session
        .call("league_entries", move |api, token| async move {
            api.league_entries(&token, region, summoner_id).await
        })
        .await
    {
        Ok(entries) => Ok(entries),
        Err(err) if ExtractError::is_not_found(&err) => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

/// Tier 1: ranked entries by the resolved summoner id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLookup;

impl RankStrategy for DirectLookup {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectLookup
    }

    fn resolve<'a>(
        &'a self,
        session: &'a mut CredentialSession,
        ctx: &'a RankContext,
    ) -> BoxFuture<'a, Result<Option<RankFound>>> {
        Box::pin(async move {
            let Some(summoner_id) = ctx.summoner_id.as_deref() else {
                return Ok(None);
            };
            let entries = entries_for(session, ctx.region, summoner_id).await?;
            Ok(preferred_entry(&entries).map(|entry| RankFound {
                entry: entry.clone(),
                summoner_id: Some(summoner_id.to_owned()),
                method: ctx.identity_method,
            }))
        })
    }
}

/// Tier 2: takes the subject's summoner id from a match participant record
/// and repeats the direct lookup with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchRecovery;

impl MatchRecovery {
    fn participant_summoner_id(payload: &Value, puuid: &str) -> Option<String> {
        payload
            .pointer("/info/participants")?
            .as_array()?
            .iter()
            .find(|participant| participant.get("puuid").and_then(Value::as_str) == Some(puuid))?
            .get("summonerId")?
            .as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
    }

    async fn latest_payload(
        session: &mut CredentialSession,
        ctx: &RankContext,
    ) -> Result<Option<Value>> {
        let (region, puuid) = (ctx.region, ctx.puuid.as_str());
        let ids = session
            .call("match_ids", move |api, token| async move {
                api.match_ids(&token, region, puuid, 0, 1).await
            })
            .await?;
        let Some(match_id) = ids.first().map(String::as_str) else {
            return Ok(None);
        };

        match session
            .call("match_detail", move |api, token| async move {
                api.match_detail(&token, region, match_id).await
            })
            .await
        {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if ExtractError::is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl RankStrategy for MatchRecovery {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MatchRecovery
    }

    fn resolve<'a>(
        &'a self,
        session: &'a mut CredentialSession,
        ctx: &'a RankContext,
    ) -> BoxFuture<'a, Result<Option<RankFound>>> {
        Box::pin(async move {
            let mut recovered = ctx
                .payloads
                .iter()
                .find_map(|payload| Self::participant_summoner_id(payload, &ctx.puuid));

            if recovered.is_none() {
                recovered = Self::latest_payload(session, ctx)
                    .await?
                    .and_then(|payload| Self::participant_summoner_id(&payload, &ctx.puuid));
            }

            let Some(summoner_id) = recovered else {
                return Ok(None);
            };
            if ctx.summoner_id.as_deref() == Some(summoner_id.as_str()) {
                tracing::debug!(
                    credential = %session.id(),
                    "recovered summoner id matches the direct lookup; skipping"
                );
                return Ok(None);
            }

            let entries = entries_for(session, ctx.region, &summoner_id).await?;
            Ok(preferred_entry(&entries).map(|entry| RankFound {
                entry: entry.clone(),
                summoner_id: Some(summoner_id.clone()),
                method: ResolutionMethod::RecoveredFromMatch,
            }))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    pub regions: Vec<Region>,
    pub queues: Vec<String>,
    pub tiers: Vec<String>,
    pub division: String,
    pub max_pages: u32,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            regions: Region::ALL.to_vec(),
            queues: vec![SOLO_QUEUE.to_owned(), FLEX_QUEUE.to_owned()],
            tiers: vec![
                "CHALLENGER".to_owned(),
                "GRANDMASTER".to_owned(),
                "MASTER".to_owned(),
            ],
            division: "I".to_owned(),
            max_pages: 5,
        }
    }
}

/// Tier 3: pages through the top-tier listing looking for the subject.
#[derive(Debug, Default, Clone)]
pub struct TierSweep {
    options: SweepOptions,
}

impl TierSweep {
    pub fn new(options: SweepOptions) -> Self {
        Self { options }
    }

    fn matches(entry: &LeagueEntry, ctx: &RankContext) -> bool {
        entry.puuid.as_deref() == Some(ctx.puuid.as_str())
            || (ctx.summoner_id.is_some() && entry.summoner_id == ctx.summoner_id)
    }
}

impl RankStrategy for TierSweep {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TierSweep
    }

    fn resolve<'a>(
        &'a self,
        session: &'a mut CredentialSession,
        ctx: &'a RankContext,
    ) -> BoxFuture<'a, Result<Option<RankFound>>> {
        Box::pin(async move {
            if !self.options.regions.contains(&ctx.region) {
                return Ok(None);
            }

            let region = ctx.region;
            let division = self.options.division.as_str();
            for queue in &self.options.queues {
                for tier in &self.options.tiers {
                    let (queue, tier) = (queue.as_str(), tier.as_str());
                    for page in 1..=self.options.max_pages {
                        let listing = session
                            .call("league_page", move |api, token| async move {
                                api.league_page(&token, region, queue, tier, division, page)
                                    .await
                            })
                            .await?;
                        if listing.is_empty() {
                            break;
                        }
                        if let Some(entry) = listing.iter().find(|entry| Self::matches(entry, ctx))
                        {
                            tracing::debug!(
                                credential = %session.id(),
                                queue,
                                tier,
                                page,
                                "subject found in league listing"
                            );
                            return Ok(Some(RankFound {
                                entry: entry.clone(),
                                summoner_id: entry.summoner_id.clone(),
                                method: ResolutionMethod::LeagueSweep,
                            }));
                        }
                    }
                }
            }
            Ok(None)
        })
    }
}
