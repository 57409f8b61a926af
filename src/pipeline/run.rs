//! The per-request run aggregate.
//!
//! A `PipelineRun` is the only mutable aggregate in the system, owned
//! exclusively by the coordinator for the run's lifetime. It tracks the
//! phase state machine, the collected worker outputs in execution order,
//! and the run-scoped tool broker.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DealdeskError;
use crate::models::{AnalysisRequest, FailureRecord, StageId, WorkerOutput};
use crate::tools::broker::ToolBroker;
use crate::workers::runner::CancelFlag;

/// Phase state machine for one run.
///
/// `accepted → research_running → research_done → product_running →
/// product_done → risk_running → risk_done → synthesizing → completed`,
/// with any running state able to transition to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Accepted,
    ResearchRunning,
    ResearchDone,
    ProductRunning,
    ProductDone,
    RiskRunning,
    RiskDone,
    Synthesizing,
    Completed,
    Failed,
}

impl RunPhase {
    /// The stage that should run next from this phase, if any.
    pub fn next_stage(&self) -> Option<StageId> {
        match self {
            RunPhase::Accepted => Some(StageId::Research),
            RunPhase::ResearchDone => Some(StageId::ProductAndTech),
            RunPhase::ProductDone => Some(StageId::Risk),
            _ => None,
        }
    }

    /// The stage currently executing, for running phases.
    pub fn active_stage(&self) -> Option<StageId> {
        match self {
            RunPhase::ResearchRunning => Some(StageId::Research),
            RunPhase::ProductRunning => Some(StageId::ProductAndTech),
            RunPhase::RiskRunning => Some(StageId::Risk),
            _ => None,
        }
    }

    /// The running phase for a stage.
    pub fn running(stage: StageId) -> RunPhase {
        match stage {
            StageId::Research => RunPhase::ResearchRunning,
            StageId::ProductAndTech => RunPhase::ProductRunning,
            StageId::Risk => RunPhase::RiskRunning,
        }
    }

    /// The done phase for a stage.
    pub fn done(stage: StageId) -> RunPhase {
        match stage {
            StageId::Research => RunPhase::ResearchDone,
            StageId::ProductAndTech => RunPhase::ProductDone,
            StageId::Risk => RunPhase::RiskDone,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RunPhase::Accepted => "accepted",
            RunPhase::ResearchRunning => "research_running",
            RunPhase::ResearchDone => "research_done",
            RunPhase::ProductRunning => "product_running",
            RunPhase::ProductDone => "product_done",
            RunPhase::RiskRunning => "risk_running",
            RunPhase::RiskDone => "risk_done",
            RunPhase::Synthesizing => "synthesizing",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

/// Coarse run status derived from the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One in-flight (or finished) analysis.
pub struct PipelineRun {
    /// Unique run id.
    pub id: String,
    /// The immutable request that started this run.
    pub request: AnalysisRequest,
    /// Worker outputs in execution order.
    outputs: Vec<WorkerOutput>,
    /// Current phase.
    pub phase: RunPhase,
    /// Failure descriptor, set when the run fails.
    pub failure: Option<FailureRecord>,
    /// Run-scoped tool broker; never shared with another run.
    pub(crate) broker: ToolBroker,
    cancel: CancelFlag,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub(crate) fn new(request: AnalysisRequest, broker: ToolBroker) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            outputs: Vec::new(),
            phase: RunPhase::Accepted,
            failure: None,
            broker,
            cancel: CancelFlag::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self.phase {
            RunPhase::Completed => RunStatus::Completed,
            RunPhase::Failed => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }

    /// Look up a worker output by its key.
    pub fn output(&self, output_key: &str) -> Option<&WorkerOutput> {
        self.outputs.iter().find(|o| o.output_key == output_key)
    }

    /// All outputs in execution order.
    pub fn outputs(&self) -> &[WorkerOutput] {
        &self.outputs
    }

    pub(crate) fn record_output(&mut self, output: WorkerOutput) {
        self.outputs.push(output);
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_phase(&mut self, phase: RunPhase) {
        log::debug!(
            "[Run {}] {} -> {}",
            self.id,
            self.phase.display_name(),
            phase.display_name()
        );
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    pub(crate) fn fail(&mut self, stage: Option<StageId>, err: &DealdeskError) {
        self.failure = Some(FailureRecord::from_error(stage, err));
        self.set_phase(RunPhase::Failed);
    }

    /// A clonable handle another task can use to request cancellation while
    /// a stage is running.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_set()
    }

    /// Total tool invocations issued by this run, across all connections.
    pub fn tool_invocations(&self) -> u64 {
        self.broker.total_invocations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use std::time::Duration;

    fn test_run() -> PipelineRun {
        let broker = ToolBroker::new(
            CapabilityRegistry::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        PipelineRun::new(
            AnalysisRequest::for_company("Acme", Some("acme.example".to_string())),
            broker,
        )
    }

    #[test]
    fn test_phase_progression() {
        assert_eq!(RunPhase::Accepted.next_stage(), Some(StageId::Research));
        assert_eq!(
            RunPhase::ResearchDone.next_stage(),
            Some(StageId::ProductAndTech)
        );
        assert_eq!(RunPhase::ProductDone.next_stage(), Some(StageId::Risk));
        assert_eq!(RunPhase::RiskDone.next_stage(), None);
        assert_eq!(RunPhase::Failed.next_stage(), None);
    }

    #[test]
    fn test_running_done_mapping() {
        for stage in StageId::all() {
            assert!(!RunPhase::running(*stage).is_terminal());
            assert!(!RunPhase::done(*stage).is_terminal());
        }
        assert_eq!(RunPhase::done(StageId::Risk), RunPhase::RiskDone);
    }

    #[test]
    fn test_outputs_keep_insertion_order() {
        let mut run = test_run();
        run.record_output(WorkerOutput::new("first_key", "a"));
        run.record_output(WorkerOutput::new("second_key", "b"));

        let keys: Vec<_> = run.outputs().iter().map(|o| o.output_key.as_str()).collect();
        assert_eq!(keys, vec!["first_key", "second_key"]);
        assert!(run.output("first_key").is_some());
        assert!(run.output("missing").is_none());
    }

    #[test]
    fn test_fail_sets_descriptor_and_terminal_phase() {
        let mut run = test_run();
        let err = DealdeskError::TurnBudgetExceeded {
            worker: "data_analyst".to_string(),
            budget: 12,
        };
        run.fail(Some(StageId::Research), &err);

        assert_eq!(run.phase, RunPhase::Failed);
        assert_eq!(run.status(), RunStatus::Failed);
        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Some(StageId::Research));
        assert_eq!(failure.kind, "turn_budget_exceeded");
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let run = test_run();
        let handle = run.cancel_handle();
        assert!(!run.cancel_requested());
        handle.set();
        assert!(run.cancel_requested());
    }
}
