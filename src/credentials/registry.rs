use crate::credentials::CredentialId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

/// Shared liveness flags consulted for routing. Unknown ids are treated as
/// dead so affinity hints toward them are ignored.
#[derive(Debug, Default)]
pub struct CredentialRegistry {
    flags: RwLock<HashMap<CredentialId, Arc<AtomicBool>>>,
}

impl CredentialRegistry {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = CredentialId>,
    {
        let registry = Self::default();
        for id in ids {
            registry.register(id);
        }
        registry
    }

    pub fn register(&self, id: CredentialId) {
        let mut flags = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        flags
            .entry(id)
            .or_insert_with(|| Arc::new(AtomicBool::new(true)));
    }

    fn flag(&self, id: &CredentialId) -> Option<Arc<AtomicBool>> {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        flags.get(id).cloned()
    }

    /// Removes the credential from routing. Returns `true` on the first call.
    pub fn mark_dead(&self, id: &CredentialId) -> bool {
        match self.flag(id) {
            Some(flag) => flag.swap(false, Ordering::SeqCst),
            None => false,
        }
    }

    pub fn liveness(&self, id: &CredentialId) -> Liveness {
        match self.flag(id) {
            Some(flag) if flag.load(Ordering::SeqCst) => Liveness::Alive,
            _ => Liveness::Dead,
        }
    }

    pub fn is_alive(&self, id: &CredentialId) -> bool {
        self.liveness(id) == Liveness::Alive
    }

    pub fn alive(&self) -> Vec<CredentialId> {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<CredentialId> = flags
            .iter()
            .filter(|(_, flag)| flag.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn alive_count(&self) -> usize {
        self.alive().len()
    }
}
