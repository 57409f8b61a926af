//! Error taxonomy for the orchestration core.
//!
//! Call-level tool failures (timeouts, malformed responses) are absorbed into
//! degraded `ToolResult`s inside a worker turn and never cross the pipeline
//! boundary as errors. Everything in this enum that does cross a boundary is
//! either fatal to a stage or a caller contract violation.

use crate::models::StageId;

/// Result alias used throughout the crate.
pub type DealdeskResult<T> = Result<T, DealdeskError>;

#[derive(Debug, thiserror::Error)]
pub enum DealdeskError {
    /// The tool-server process could not be spawned or never completed its
    /// handshake. Fatal to the stage when the capability is required.
    #[error("failed to start tool server '{capability}': {reason}")]
    ConnectionStart { capability: String, reason: String },

    /// A single tool call exceeded its deadline. Converted into a degraded
    /// `ToolResult` before it reaches the worker loop; never aborts a run.
    #[error("tool call '{tool}' timed out after {timeout_secs}s")]
    CallTimeout { tool: String, timeout_secs: u64 },

    /// The reasoning loop exceeded its configured tool-call cycle ceiling.
    #[error("worker '{worker}' exceeded its turn budget of {budget} tool-call cycles")]
    TurnBudgetExceeded { worker: String, budget: u32 },

    /// Synthesis was invoked before every stage produced its output. This is
    /// a sequencing bug in the caller, not a runtime tool failure.
    #[error("missing report section: no output recorded under key '{output_key}'")]
    MissingSection { output_key: String },

    /// The inbound request violated its invariant before any stage ran.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A worker referenced a capability set that is not registered.
    #[error("unknown capability set '{0}'")]
    UnknownCapability(String),

    /// The reasoning-model boundary failed (HTTP error, bad payload, or the
    /// per-decision timeout elapsed). Fatal to the stage.
    #[error("reasoner failure: {0}")]
    Reasoner(String),

    /// The run was cancelled by the caller mid-stage.
    #[error("pipeline run cancelled during stage {stage:?}")]
    Cancelled { stage: StageId },

    /// Instruction template could not be rendered.
    #[error("template error for worker '{worker}': {reason}")]
    Template { worker: String, reason: String },
}

impl DealdeskError {
    /// Short machine-readable kind, used in failure descriptors.
    pub fn kind(&self) -> &'static str {
        match self {
            DealdeskError::ConnectionStart { .. } => "connection_start",
            DealdeskError::CallTimeout { .. } => "call_timeout",
            DealdeskError::TurnBudgetExceeded { .. } => "turn_budget_exceeded",
            DealdeskError::MissingSection { .. } => "missing_section",
            DealdeskError::InvalidRequest(_) => "invalid_request",
            DealdeskError::UnknownCapability(_) => "unknown_capability",
            DealdeskError::Reasoner(_) => "reasoner",
            DealdeskError::Cancelled { .. } => "cancelled",
            DealdeskError::Template { .. } => "template",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = DealdeskError::TurnBudgetExceeded {
            worker: "research".to_string(),
            budget: 12,
        };
        assert_eq!(err.kind(), "turn_budget_exceeded");
        assert!(err.to_string().contains("research"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_missing_section_message() {
        let err = DealdeskError::MissingSection {
            output_key: "final_risk_assessment_output".to_string(),
        };
        assert!(err.to_string().contains("final_risk_assessment_output"));
    }
}
