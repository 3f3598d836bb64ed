//! Subject identity across credential namespaces.
//!
//! The upstream encrypts player ids per API key, so a subject registered with
//! one credential must be re-derived before another credential can use it.
//! Each worker keeps its own [`IdentityCache`] for the lifetime of its
//! credential.

use crate::credentials::CredentialSession;
use crate::error::ExtractError;
use crate::routing::Region;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A tracked player. `puuid` is canonical: the id in the namespace of the
/// credential that registered the subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
}

impl Subject {
    pub fn new(
        puuid: impl Into<String>,
        game_name: impl Into<String>,
        tag_line: impl Into<String>,
    ) -> Self {
        Self {
            puuid: puuid.into(),
            game_name: game_name.into(),
            tag_line: tag_line.into(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

/// Display-form player id (`GameName#TAG`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    pub fn parse(display: &str) -> Result<Self, ExtractError> {
        let invalid = || ExtractError::InvalidSubject {
            subject: display.to_owned(),
        };

        let mut parts = display.split('#');
        let (Some(name), Some(tag), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let (name, tag) = (name.trim(), tag.trim());
        if name.is_empty() || tag.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            game_name: name.to_owned(),
            tag_line: tag.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// The canonical id was valid in this credential's namespace.
    Direct,
    /// Re-derived through the riot id lookup.
    IdentityLookup,
    /// Summoner id taken from a match participant record.
    RecoveredFromMatch,
    /// Summoner id found in the top-tier league listing.
    LeagueSweep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub subject: String,
    pub puuid: String,
    pub summoner_id: Option<String>,
    pub method: ResolutionMethod,
}

#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<String, IdentityMapping>,
}

impl IdentityCache {
    pub fn get(&self, subject: &str) -> Option<&IdentityMapping> {
        self.entries.get(subject)
    }

    pub fn insert(&mut self, mapping: IdentityMapping) {
        self.entries.insert(mapping.subject.clone(), mapping);
    }

    pub fn invalidate(&mut self, subject: &str) -> Option<IdentityMapping> {
        self.entries.remove(subject)
    }

    /// Records a summoner id recovered after resolution.
    pub fn enrich(&mut self, subject: &str, summoner_id: String, method: ResolutionMethod) {
        if let Some(mapping) = self.entries.get_mut(subject) {
            mapping.summoner_id = Some(summoner_id);
            mapping.method = method;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub mapping: IdentityMapping,
    pub from_cache: bool,
}

/// Resolves `subject` in the session credential's namespace.
///
/// Order: cache, direct summoner lookup with the canonical id, then (on a
/// namespace mismatch) riot id lookup followed by a summoner lookup with the
/// namespace puuid.
pub async fn resolve(
    session: &mut CredentialSession,
    cache: &mut IdentityCache,
    subject: &Subject,
    region: Region,
) -> Result<Resolved> {
    if let Some(mapping) = cache.get(&subject.puuid) {
        return Ok(Resolved {
            mapping: mapping.clone(),
            from_cache: true,
        });
    }

    let canonical = subject.puuid.as_str();
    let direct = session
        .call("summoner_by_puuid", move |api, token| async move {
            api.summoner_by_puuid(&token, region, canonical).await
        })
        .await;

    let mapping = match direct {
        Ok(summoner) => IdentityMapping {
            subject: subject.puuid.clone(),
            puuid: summoner.puuid,
            summoner_id: summoner.id,
            method: ResolutionMethod::Direct,
        },
        Err(err) if ExtractError::is_namespace_mismatch(&err) => {
            tracing::debug!(
                credential = %session.id(),
                subject = %subject,
                "canonical id foreign to this credential; re-deriving"
            );
            let (name, tag) = (subject.game_name.as_str(), subject.tag_line.as_str());
            let account = session
                .call("account_by_riot_id", move |api, token| async move {
                    api.account_by_riot_id(&token, region, name, tag).await
                })
                .await?;

            let scoped = account.puuid.as_str();
            let summoner = session
                .call("summoner_by_puuid", move |api, token| async move {
                    api.summoner_by_puuid(&token, region, scoped).await
                })
                .await?;

            IdentityMapping {
                subject: subject.puuid.clone(),
                puuid: account.puuid.clone(),
                summoner_id: summoner.id,
                method: ResolutionMethod::IdentityLookup,
            }
        }
        Err(err) => return Err(err),
    };

    cache.insert(mapping.clone());
    Ok(Resolved {
        mapping,
        from_cache: false,
    })
}
