//! Canonical identity lookup used at enqueue time.

use crate::credentials::CredentialSession;
use crate::error::ExtractError;
use crate::identity::{RiotId, Subject};
use crate::routing::Region;
use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

pub trait SubjectDirectory: Send + Sync {
    /// Resolves a riot id to its canonical subject, or `InvalidSubject`.
    fn lookup<'a>(&'a self, riot_id: &'a RiotId, region: Region) -> BoxFuture<'a, Result<Subject>>;
}

/// Tries each lookup credential in order. A credential that is cooling down,
/// rate limited, or rejected is skipped; a definitive not-found ends the search.
pub struct ApiSubjectDirectory {
    sessions: Vec<Mutex<CredentialSession>>,
}

impl ApiSubjectDirectory {
    pub fn new(sessions: Vec<CredentialSession>) -> Self {
        Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    async fn lookup_inner(&self, riot_id: &RiotId, region: Region) -> Result<Subject> {
        let invalid = || -> anyhow::Error {
            ExtractError::InvalidSubject {
                subject: format!("{}#{}", riot_id.game_name, riot_id.tag_line),
            }
            .into()
        };

        for slot in &self.sessions {
            let mut session = slot.lock().await;
            if !session.is_alive() || session.is_cooling_down() {
                continue;
            }

            let (name, tag) = (riot_id.game_name.as_str(), riot_id.tag_line.as_str());
            let result = session
                .call("account_by_riot_id", move |api, token| async move {
                    api.account_by_riot_id(&token, region, name, tag).await
                })
                .await;

            match result {
                Ok(account) => {
                    return Ok(Subject::new(
                        account.puuid,
                        account.game_name.unwrap_or_else(|| riot_id.game_name.clone()),
                        account.tag_line.unwrap_or_else(|| riot_id.tag_line.clone()),
                    ));
                }
                Err(err) if ExtractError::is_not_found(&err) => return Err(invalid()),
                Err(err) if ExtractError::is_cancelled(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        credential = %session.id(),
                        error = %err,
                        "lookup credential unavailable; trying next"
                    );
                }
            }
        }

        tracing::warn!(
            game_name = %riot_id.game_name,
            tag_line = %riot_id.tag_line,
            "no lookup credential could reach the account"
        );
        Err(invalid())
    }
}

impl SubjectDirectory for ApiSubjectDirectory {
    fn lookup<'a>(&'a self, riot_id: &'a RiotId, region: Region) -> BoxFuture<'a, Result<Subject>> {
        Box::pin(self.lookup_inner(riot_id, region))
    }
}
