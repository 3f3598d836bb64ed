//! Extraction worker split across focused submodules:
//! - `types`: exit reasons and per-task progress
//! - `shared`: handles shared by every worker (queue, store, rank resolver)
//! - `process`: worker struct plus the claim/extract/ack loop
//! - `tests`: worker unit tests against the scripted upstream

mod process;
mod shared;
mod types;


pub use process::Worker;
pub use shared::{WorkerShared, WorkerSharedParams};
pub use types::WorkerExit;
