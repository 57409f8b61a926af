//! Specialist workers: static specs, instruction templates, the reasoning
//! boundary, and the bounded turn runner.

pub mod prompts;
pub mod reasoner;
pub mod runner;
pub mod spec;

pub use reasoner::{HttpReasoner, Reasoner, ReasonerStep, TranscriptEntry};
pub use runner::{run_worker, CancelFlag};
pub use spec::{default_worker_specs, WorkerSpec};
