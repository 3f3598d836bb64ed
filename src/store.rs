//! Raw document store consumed by the workers and read by the transform stage.
//!
//! Records are keyed by match id and inserted at most once; repeated upserts
//! report [`UpsertOutcome::Duplicate`] and leave the stored record untouched.

use crate::identity::{ResolutionMethod, Subject};
use crate::rank::RankOutcome;
use crate::routing::Region;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub record_id: String,
    pub subject: String,
    pub puuid: String,
    pub payload: Value,
    pub processed: bool,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(record_id: String, subject: String, puuid: String, payload: Value) -> Self {
        Self {
            record_id,
            subject,
            puuid,
            payload,
            processed: false,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub subject: Subject,
    pub region: Region,
    pub rank: RankOutcome,
    pub rank_method: Option<ResolutionMethod>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSubject {
    pub subject: Subject,
    pub region: Region,
}

pub trait DocumentStore: Send + Sync {
    fn upsert_record(&self, record: RawRecord) -> BoxFuture<'_, Result<UpsertOutcome>>;

    fn contains_record<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn records_for_subject<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<Vec<RawRecord>>>;

    /// Records the transform stage has not consumed yet.
    fn unprocessed_records(&self) -> BoxFuture<'_, Result<Vec<RawRecord>>>;

    fn upsert_subject(&self, subject: TrackedSubject) -> BoxFuture<'_, Result<()>>;

    fn subjects(&self) -> BoxFuture<'_, Result<Vec<TrackedSubject>>>;

    fn upsert_profile(&self, profile: SubjectProfile) -> BoxFuture<'_, Result<()>>;

    fn profile<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<Option<SubjectProfile>>>;
}

#[derive(Default)]
struct StoreState {
    records: HashMap<String, RawRecord>,
    order: Vec<String>,
    subjects: Vec<TrackedSubject>,
    profiles: HashMap<String, SubjectProfile>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<StoreState>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn upsert_record(&self, record: RawRecord) -> BoxFuture<'_, Result<UpsertOutcome>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.records.contains_key(&record.record_id) {
                return Ok(UpsertOutcome::Duplicate);
            }
            state.order.push(record.record_id.clone());
            state.records.insert(record.record_id.clone(), record);
            Ok(UpsertOutcome::Inserted)
        })
    }

    fn contains_record<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.state.read().await.records.contains_key(record_id)) })
    }

    fn records_for_subject<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<Vec<RawRecord>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .order
                .iter()
                .filter_map(|id| state.records.get(id))
                .filter(|record| record.subject == subject)
                .cloned()
                .collect())
        })
    }

    fn unprocessed_records(&self) -> BoxFuture<'_, Result<Vec<RawRecord>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .order
                .iter()
                .filter_map(|id| state.records.get(id))
                .filter(|record| !record.processed)
                .cloned()
                .collect())
        })
    }

    fn upsert_subject(&self, subject: TrackedSubject) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            match state
                .subjects
                .iter_mut()
                .find(|tracked| tracked.subject.puuid == subject.subject.puuid)
            {
                Some(existing) => *existing = subject,
                None => state.subjects.push(subject),
            }
            Ok(())
        })
    }

    fn subjects(&self) -> BoxFuture<'_, Result<Vec<TrackedSubject>>> {
        Box::pin(async move { Ok(self.state.read().await.subjects.clone()) })
    }

    fn upsert_profile(&self, profile: SubjectProfile) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state
                .profiles
                .insert(profile.subject.puuid.clone(), profile);
            Ok(())
        })
    }

    fn profile<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<Option<SubjectProfile>>> {
        Box::pin(async move { Ok(self.state.read().await.profiles.get(subject).cloned()) })
    }
}
