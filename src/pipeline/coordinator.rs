//! The coordinator: owns the fixed pipeline topology and the run aggregate.
//!
//! Drives the three specialist stages in order, computes each stage's input
//! slice from the request and prior outputs, and performs the final
//! synthesis. Stage failures stop the pipeline; there is no automatic
//! retry, callers retry by starting a new run.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::capability::CapabilityRegistry;
use crate::config::RuntimeConfig;
use crate::error::{DealdeskError, DealdeskResult};
use crate::models::{AnalysisRequest, FailureRecord, Report, StageId};
use crate::pipeline::run::{PipelineRun, RunPhase};
use crate::pipeline::synthesizer;
use crate::tools::broker::ToolBroker;
use crate::workers::reasoner::Reasoner;
use crate::workers::runner::run_worker;
use crate::workers::spec::{
    default_worker_specs, spec_for_stage, WorkerSpec, PRODUCT_OUTPUT_KEY, RESEARCH_OUTPUT_KEY,
};

/// Ceiling on competitor references forwarded from the research briefing to
/// the product stage.
const MAX_COMPETITOR_REFERENCES: usize = 10;

pub struct Coordinator {
    config: RuntimeConfig,
    registry: CapabilityRegistry,
    specs: Vec<WorkerSpec>,
    reasoner: Arc<dyn Reasoner>,
}

impl Coordinator {
    pub fn new(config: RuntimeConfig, reasoner: Arc<dyn Reasoner>) -> Self {
        let registry = config.capability_registry();
        Self {
            config,
            registry,
            specs: default_worker_specs(),
            reasoner,
        }
    }

    /// Replace the default specialist team (tests, alternative prompts).
    pub fn with_specs(mut self, specs: Vec<WorkerSpec>) -> Self {
        self.specs = specs;
        self
    }

    /// Validate a request and open a run in `accepted`.
    pub fn start(&self, request: AnalysisRequest) -> DealdeskResult<PipelineRun> {
        request.validate()?;
        let broker = ToolBroker::new(
            self.registry.clone(),
            self.config.connect_timeout(),
            self.config.shutdown_grace(),
        );
        let run = PipelineRun::new(request, broker);
        log::info!(
            "[Coordinator] accepted run {} for '{}'",
            run.id,
            run.request.subject_label()
        );
        Ok(run)
    }

    /// Execute the next pending stage, if any.
    ///
    /// A no-op once the run reaches `risk_done` or a terminal phase. On a
    /// stage failure the run moves to `failed`, its connections are closed,
    /// and later stages never execute.
    pub async fn advance(&self, run: &mut PipelineRun) -> DealdeskResult<()> {
        let stage = match run.phase.next_stage() {
            Some(stage) => stage,
            None => {
                log::debug!(
                    "[Coordinator] advance is a no-op in phase {}",
                    run.phase.display_name()
                );
                return Ok(());
            }
        };

        if run.cancel_requested() {
            let err = DealdeskError::Cancelled { stage };
            run.broker.close_all().await;
            run.fail(Some(stage), &err);
            return Err(err);
        }

        let spec = spec_for_stage(&self.specs, stage).ok_or_else(|| {
            DealdeskError::InvalidRequest(format!(
                "no worker registered for stage '{}'",
                stage.display_name()
            ))
        })?;

        run.set_phase(RunPhase::running(stage));
        log::info!(
            "[Coordinator] run {}: stage '{}' -> worker '{}'",
            run.id,
            stage.display_name(),
            spec.id
        );

        let inputs = self.stage_inputs(run, stage)?;
        let cancel = run.cancel_handle();
        let result = run_worker(
            spec,
            &inputs,
            self.reasoner.as_ref(),
            &mut run.broker,
            self.config.max_tool_cycles,
            self.config.reasoner_timeout(),
            &cancel,
        )
        .await;

        match result {
            Ok(output) => {
                run.record_output(output);
                run.set_phase(RunPhase::done(stage));
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "[Coordinator] run {} failed in stage '{}': {}",
                    run.id,
                    stage.display_name(),
                    err
                );
                // Cleanup on the failure path too: no tool-server leaks.
                run.broker.close_all().await;
                run.fail(Some(stage), &err);
                Err(err)
            }
        }
    }

    /// Synthesize the final memo. Requires `risk_done`.
    ///
    /// Releases every tool connection the run opened, on success and on
    /// synthesis failure alike. Calling before the pipeline finished is a
    /// sequencing bug and fails without partial synthesis (and without
    /// disturbing a still-advancing run).
    pub async fn finalize(&self, run: &mut PipelineRun) -> DealdeskResult<Report> {
        if run.phase != RunPhase::RiskDone {
            // A stage output is genuinely missing when finalize comes too
            // early; a terminal run with all outputs present is a different
            // sequencing mistake and gets named as such.
            if let Some(missing) = self
                .specs
                .iter()
                .find(|s| run.output(&s.output_key).is_none())
            {
                return Err(DealdeskError::MissingSection {
                    output_key: missing.output_key.clone(),
                });
            }
            return Err(DealdeskError::InvalidRequest(format!(
                "finalize is not valid in phase '{}'",
                run.phase.display_name()
            )));
        }

        run.set_phase(RunPhase::Synthesizing);
        let result = synthesizer::synthesize(run);
        run.broker.close_all().await;

        match result {
            Ok(report) => {
                run.set_phase(RunPhase::Completed);
                log::info!("[Coordinator] run {} completed", run.id);
                Ok(report)
            }
            Err(err) => {
                run.fail(None, &err);
                Err(err)
            }
        }
    }

    /// Cancel a run: tear down its tool connections and move it to a
    /// terminal `failed` phase. A no-op on already-terminal runs.
    pub async fn cancel(&self, run: &mut PipelineRun) {
        if run.phase.is_terminal() {
            return;
        }
        run.cancel_handle().set();
        run.broker.close_all().await;

        let stage = run
            .phase
            .active_stage()
            .or_else(|| run.phase.next_stage())
            .unwrap_or(StageId::Risk);
        let err = DealdeskError::Cancelled { stage };
        run.fail(Some(stage), &err);
        log::info!("[Coordinator] run {} cancelled", run.id);
    }

    /// Drive a request through every stage and synthesis.
    ///
    /// The convenience surface the inbound layer consumes: either a
    /// complete report or a failure descriptor naming the failing stage
    /// and error kind. Never a partial report.
    pub async fn run_to_completion(
        &self,
        request: AnalysisRequest,
    ) -> Result<Report, FailureRecord> {
        let mut run = match self.start(request) {
            Ok(run) => run,
            Err(err) => return Err(FailureRecord::from_error(None, &err)),
        };

        while run.phase.next_stage().is_some() {
            if self.advance(&mut run).await.is_err() {
                let failure = run
                    .failure
                    .clone()
                    .unwrap_or_else(|| FailureRecord {
                        stage: None,
                        kind: "unknown".to_string(),
                        message: "stage failed without a failure record".to_string(),
                    });
                return Err(failure);
            }
        }

        match self.finalize(&mut run).await {
            Ok(report) => Ok(report),
            Err(err) => Err(run
                .failure
                .clone()
                .unwrap_or_else(|| FailureRecord::from_error(None, &err))),
        }
    }

    /// Compute the input slice for a stage from the request and the
    /// already-produced outputs it declares as dependencies.
    fn stage_inputs(
        &self,
        run: &PipelineRun,
        stage: StageId,
    ) -> DealdeskResult<HashMap<String, Value>> {
        let request = &run.request;
        let mut inputs = HashMap::new();
        inputs.insert("subject_label".to_string(), json!(request.subject_label()));
        inputs.insert("subject_name".to_string(), json!(request.subject_name));
        inputs.insert(
            "subject_website".to_string(),
            json!(request.subject_website),
        );
        inputs.insert("raw_idea".to_string(), json!(request.raw_idea));
        inputs.insert(
            "competitor_hints".to_string(),
            json!(request.competitor_hints),
        );

        match stage {
            StageId::Research => {}
            StageId::ProductAndTech => {
                let research = self.require_upstream(run, RESEARCH_OUTPUT_KEY)?;
                inputs.insert("research_briefing".to_string(), json!(research));
                inputs.insert(
                    "competitor_references".to_string(),
                    json!(extract_competitor_references(&research)),
                );
            }
            StageId::Risk => {
                let research = self.require_upstream(run, RESEARCH_OUTPUT_KEY)?;
                let product = self.require_upstream(run, PRODUCT_OUTPUT_KEY)?;
                inputs.insert(
                    "consolidated_findings".to_string(),
                    json!(format!("{}\n\n{}", research, product)),
                );
            }
        }
        Ok(inputs)
    }

    fn require_upstream(&self, run: &PipelineRun, output_key: &str) -> DealdeskResult<String> {
        run.output(output_key)
            .map(|o| o.body.clone())
            .ok_or_else(|| DealdeskError::MissingSection {
                output_key: output_key.to_string(),
            })
    }
}

/// Pull competitor mentions out of a research briefing.
///
/// Purely lexical: lines that mention competitors, capped, trimmed of list
/// markers. The product worker treats these as leads, not ground truth.
fn extract_competitor_references(research_body: &str) -> Vec<String> {
    research_body
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', ' ']).trim())
        .filter(|line| !line.is_empty() && line.to_lowercase().contains("competitor"))
        .map(|line| line.to_string())
        .take(MAX_COMPETITOR_REFERENCES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_competitor_references() {
        let briefing = "\
**4. Market & Competition:**
- Target Market: mid-market logistics
- Key Competitors: Globex, Initech, Umbrella
Some unrelated line.
* Competitor pricing is aggressive.
";
        let refs = extract_competitor_references(briefing);
        assert_eq!(refs.len(), 2);
        assert!(refs[0].contains("Globex"));
        assert!(refs[1].contains("pricing"));
    }

    #[test]
    fn test_extract_competitor_references_empty() {
        assert!(extract_competitor_references("no relevant lines here").is_empty());
    }
}
