//! Core domain types: the inbound request, worker outputs, the final report,
//! and the structured failure descriptor returned in place of a report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DealdeskError, DealdeskResult};

/// The three specialist stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Research,
    ProductAndTech,
    Risk,
}

impl StageId {
    /// All stages in pipeline order.
    pub fn all() -> &'static [StageId] {
        &[StageId::Research, StageId::ProductAndTech, StageId::Risk]
    }

    /// The stage that runs after this one, if any.
    pub fn next(&self) -> Option<StageId> {
        match self {
            StageId::Research => Some(StageId::ProductAndTech),
            StageId::ProductAndTech => Some(StageId::Risk),
            StageId::Risk => None,
        }
    }

    /// Display name used in logs and failure descriptors.
    pub fn display_name(&self) -> &'static str {
        match self {
            StageId::Research => "research",
            StageId::ProductAndTech => "product_and_tech",
            StageId::Risk => "risk",
        }
    }
}

/// An inbound analysis request.
///
/// Immutable once accepted by the coordinator. At least one of
/// `subject_name` or `raw_idea` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Official name of the startup, if known.
    pub subject_name: Option<String>,
    /// Official website URL, if known.
    pub subject_website: Option<String>,
    /// Free-text idea description when no named company exists yet.
    pub raw_idea: Option<String>,
    /// Caller-supplied competitor names, in priority order.
    #[serde(default)]
    pub competitor_hints: Vec<String>,
}

impl AnalysisRequest {
    /// Build a request for a named company.
    pub fn for_company(name: impl Into<String>, website: Option<String>) -> Self {
        Self {
            subject_name: Some(name.into()),
            subject_website: website,
            raw_idea: None,
            competitor_hints: Vec::new(),
        }
    }

    /// Build a request for a raw idea with no named company.
    pub fn for_idea(idea: impl Into<String>) -> Self {
        Self {
            raw_idea: Some(idea.into()),
            ..Default::default()
        }
    }

    /// Enforce the request invariant: a name or an idea must be present and
    /// non-blank.
    pub fn validate(&self) -> DealdeskResult<()> {
        let has_name = self
            .subject_name
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        let has_idea = self
            .raw_idea
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_name && !has_idea {
            return Err(DealdeskError::InvalidRequest(
                "either subjectName or rawIdea must be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// The label used for the subject throughout the memo.
    pub fn subject_label(&self) -> String {
        if let Some(name) = self.subject_name.as_deref() {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        "Unnamed venture (idea-stage)".to_string()
    }
}

/// The single structured result of one worker turn.
///
/// Owned by the coordinator once returned; immutable; exactly one per
/// worker spec per pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutput {
    /// Key the synthesizer looks this fragment up under.
    pub output_key: String,
    /// Structured markdown-like body. Non-empty by contract; internal
    /// structure is advisory and never parsed here.
    pub body: String,
    /// When the worker turn completed.
    pub produced_at: DateTime<Utc>,
}

impl WorkerOutput {
    pub fn new(output_key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            output_key: output_key.into(),
            body: body.into(),
            produced_at: Utc::now(),
        }
    }
}

/// The final synthesized memo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Run that produced this report.
    pub run_id: String,
    /// Full memo text, ten fixed sections in order.
    pub body: String,
    /// When synthesis completed.
    pub generated_at: DateTime<Utc>,
}

/// Structured failure descriptor surfaced to the caller instead of a
/// partially synthesized report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Stage that was running when the failure occurred, if any stage was.
    pub stage: Option<StageId>,
    /// Machine-readable error kind (see `DealdeskError::kind`).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl FailureRecord {
    pub fn from_error(stage: Option<StageId>, err: &DealdeskError) -> Self {
        Self {
            stage,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
