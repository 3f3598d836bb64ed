//! Extraction processing: batch planning and enqueueing, the per-credential
//! worker loop, pool supervision, and retry pacing.

pub mod backoff;
pub mod orchestrator;
pub mod worker;
pub mod worker_pool;
