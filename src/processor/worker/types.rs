use serde_json::Value;

/// Match payloads kept from a batch for summoner id recovery.
pub(super) const MAX_RECOVERY_PAYLOADS: usize = 5;

/// Why a worker loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    CredentialDead,
}

/// What a task accomplished before it finished or was interrupted.
#[derive(Debug, Default)]
pub(super) struct TaskProgress {
    /// Leading ids of the slice that are stored (inserted, duplicate, or
    /// missing upstream).
    pub(super) persisted: u32,
    pub(super) inserted: u64,
    pub(super) duplicates: u64,
    pub(super) payloads: Vec<Value>,
}

impl TaskProgress {
    pub(super) fn keep_payload(&mut self, payload: &Value) {
        if self.payloads.len() < MAX_RECOVERY_PAYLOADS {
            self.payloads.push(payload.clone());
        }
    }
}
