use crate::credentials::CredentialSession;
use crate::error::ExtractError;
use crate::rank::strategies::{DirectLookup, MatchRecovery, SweepOptions, TierSweep};
use crate::rank::{RankContext, RankOutcome, RankStrategy, StrategyKind};
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankReport {
    pub outcome: RankOutcome,
    /// Strategies that ran, in order.
    pub attempted: Vec<StrategyKind>,
    /// Summoner id the winning strategy used, when one was recovered.
    pub summoner_id: Option<String>,
}

/// First-success combinator over rank strategies.
pub struct RankResolver {
    strategies: Vec<Box<dyn RankStrategy>>,
}

impl RankResolver {
    pub fn new(strategies: Vec<Box<dyn RankStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct lookup, match recovery, then the tier sweep.
    pub fn standard(sweep: SweepOptions) -> Self {
        Self::new(vec![
            Box::new(DirectLookup),
            Box::new(MatchRecovery),
            Box::new(TierSweep::new(sweep)),
        ])
    }

    pub async fn resolve(
        &self,
        session: &mut CredentialSession,
        ctx: &RankContext,
    ) -> Result<RankReport> {
        let mut attempted = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let kind = strategy.kind();
            attempted.push(kind);

            match strategy.resolve(session, ctx).await {
                Ok(Some(found)) => {
                    tracing::debug!(
                        credential = %session.id(),
                        strategy = %kind,
                        tier = %found.entry.tier,
                        "rank resolved"
                    );
                    return Ok(RankReport {
                        outcome: RankOutcome::Ranked {
                            entry: found.entry,
                            method: found.method,
                        },
                        attempted,
                        summoner_id: found.summoner_id,
                    });
                }
                Ok(None) => {}
                Err(err) if ExtractError::interrupts_credential(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        credential = %session.id(),
                        strategy = %kind,
                        error = %err,
                        "rank strategy failed; trying next"
                    );
                }
            }
        }

        Ok(RankReport {
            outcome: RankOutcome::Unranked,
            attempted,
            summoner_id: None,
        })
    }
}
