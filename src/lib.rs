pub mod api;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod processor;
pub mod queue;
pub mod rank;
pub mod routing;
pub mod runtime;
pub mod store;

pub use api::{ApiClientOptions, HttpApiClient, UpstreamApi};
pub use credentials::{Credential, CredentialId, CredentialRegistry, CredentialSession, RateLimiter};
pub use error::ExtractError;
pub use identity::{RiotId, Subject};
pub use processor::orchestrator::{
    plan_batches, ApiSubjectDirectory, EnqueueReceipt, Orchestrator, SubjectDirectory,
};
pub use processor::worker::{Worker, WorkerExit};
pub use queue::{InMemoryTaskQueue, Task, TaskQueue};
pub use rank::{RankOutcome, RankResolver};
pub use routing::{route_tag, Region, RegionRouter};
pub use runtime::config::{ExtractorConfig, ExtractorConfigBuilder, ExtractorConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{DocumentStore, InMemoryDocumentStore, RawRecord};
