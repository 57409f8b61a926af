// Module declarations
pub mod capability;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod tools;
pub mod workers;

// Re-export the types callers need to drive an analysis
pub use capability::{CapabilityRegistry, CapabilitySet};
pub use config::RuntimeConfig;
pub use error::DealdeskError;
pub use models::{AnalysisRequest, FailureRecord, Report, WorkerOutput};
pub use pipeline::coordinator::Coordinator;
pub use pipeline::run::{PipelineRun, RunPhase, RunStatus};
pub use workers::reasoner::{HttpReasoner, Reasoner, ReasonerStep};
pub use workers::spec::{default_worker_specs, WorkerSpec};
