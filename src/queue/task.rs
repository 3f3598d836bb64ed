use crate::credentials::{CredentialId, CredentialRegistry};
use crate::identity::Subject;
use crate::routing::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Placeholder carried by planned tasks until the queue assigns an id.
    pub const UNASSIGNED: TaskId = TaskId(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// Identity of the history slice a task covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub subject: String,
    pub offset: u32,
}

/// One batch of a subject's history: match ids `[offset, offset + count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject: Subject,
    pub region: Region,
    pub offset: u32,
    pub count: u32,
    pub affinity: Option<CredentialId>,
    pub attempts: u32,
    pub state: TaskState,
    pub refresh_profile: bool,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(subject: Subject, region: Region, offset: u32, count: u32) -> Self {
        Self {
            id: TaskId::UNASSIGNED,
            subject,
            region,
            offset,
            count,
            affinity: None,
            attempts: 0,
            state: TaskState::Pending,
            refresh_profile: offset == 0,
            last_error: None,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            subject: self.subject.puuid.clone(),
            offset: self.offset,
        }
    }

    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.count)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Done | TaskState::Failed)
    }

    /// Moves the start of the slice past `persisted` already-handled ids.
    pub fn advance(&mut self, persisted: u32) {
        let persisted = persisted.min(self.count);
        self.offset += persisted;
        self.count -= persisted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackDisposition {
    Requeue,
    Fail,
}

/// Result of acking or nacking a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Settled,
    /// The caller no longer holds the claim (it expired or was released);
    /// the queue was left untouched.
    ClaimLost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub done: u64,
    pub failed: usize,
}

impl QueueStats {
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

/// The claiming side of a dequeue: one credential, its region scope, and the
/// registry used to discard affinity toward dead credentials.
#[derive(Debug, Clone)]
pub struct Consumer {
    credential: CredentialId,
    scope: Option<Vec<Region>>,
    registry: Arc<CredentialRegistry>,
}

impl Consumer {
    pub fn new(
        credential: CredentialId,
        scope: Option<Vec<Region>>,
        registry: Arc<CredentialRegistry>,
    ) -> Self {
        Self {
            credential,
            scope,
            registry,
        }
    }

    pub fn credential(&self) -> &CredentialId {
        &self.credential
    }

    pub fn accepts(&self, task: &Task) -> bool {
        let in_scope = self
            .scope
            .as_ref()
            .map_or(true, |regions| regions.contains(&task.region));
        if !in_scope {
            return false;
        }

        match &task.affinity {
            None => true,
            Some(owner) if *owner == self.credential => true,
            Some(owner) => !self.registry.is_alive(owner),
        }
    }
}
