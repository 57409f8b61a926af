//! Pipeline sequencing: the per-request run aggregate, the coordinator that
//! drives the fixed stage order, and the deterministic report synthesizer.

pub mod coordinator;
pub mod run;
pub mod synthesizer;

pub use coordinator::Coordinator;
pub use run::{PipelineRun, RunPhase, RunStatus};
