//! Worker specifications.
//!
//! Each specialist is configuration, not a code path: one id, one
//! instruction template, one bound capability set, one output slot. All
//! workers execute through the same generic runner.

use serde::{Deserialize, Serialize};

use crate::models::StageId;
use crate::workers::prompts;

/// Output key the research briefing is recorded under.
pub const RESEARCH_OUTPUT_KEY: &str = "research_briefing_output";
/// Output key the product and technology assessment is recorded under.
pub const PRODUCT_OUTPUT_KEY: &str = "final_product_and_tech_output";
/// Output key the risk assessment is recorded under.
pub const RISK_OUTPUT_KEY: &str = "final_risk_assessment_output";

/// Static configuration for one specialist worker.
///
/// Created at process start, never mutated. Multiple specs may reference
/// the same capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Unique worker id (e.g. "data_analyst").
    pub id: String,
    /// Display name for logs.
    pub display_name: String,
    /// Pipeline stage this worker serves.
    pub stage: StageId,
    /// Tera template for the worker's instruction.
    pub instruction_template: String,
    /// Name of the capability set this worker may use.
    pub capability: String,
    /// Key its output is recorded under for synthesis.
    pub output_key: String,
}

impl WorkerSpec {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        stage: StageId,
        instruction_template: impl Into<String>,
        capability: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            stage,
            instruction_template: instruction_template.into(),
            capability: capability.into(),
            output_key: output_key.into(),
        }
    }
}

/// The fixed specialist team, in pipeline order:
/// - `data_analyst`: foundational research briefing (market, team, funding)
/// - `product_and_tech_analyst`: product and technology deep dive
/// - `risk_analyst`: formal risk assessment over the prior findings
pub fn default_worker_specs() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec::new(
            "data_analyst",
            "Startup Research Analyst",
            StageId::Research,
            prompts::DATA_ANALYST_TEMPLATE,
            "search",
            RESEARCH_OUTPUT_KEY,
        ),
        WorkerSpec::new(
            "product_and_tech_analyst",
            "Product & Technology Analyst",
            StageId::ProductAndTech,
            prompts::PRODUCT_AND_TECH_TEMPLATE,
            "browser",
            PRODUCT_OUTPUT_KEY,
        ),
        WorkerSpec::new(
            "risk_analyst",
            "Risk Analyst",
            StageId::Risk,
            prompts::RISK_ANALYST_TEMPLATE,
            "search",
            RISK_OUTPUT_KEY,
        ),
    ]
}

/// Find the spec serving a given stage.
pub fn spec_for_stage(specs: &[WorkerSpec], stage: StageId) -> Option<&WorkerSpec> {
    specs.iter().find(|s| s.stage == stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_specs() {
        let specs = default_worker_specs();
        assert_eq!(specs.len(), 3);

        // One spec per stage, ids and output keys unique
        for stage in StageId::all() {
            assert!(spec_for_stage(&specs, *stage).is_some());
        }
        let mut keys: Vec<_> = specs.iter().map(|s| s.output_key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_specs_follow_pipeline_order() {
        let specs = default_worker_specs();
        assert_eq!(specs[0].stage, StageId::Research);
        assert_eq!(specs[1].stage, StageId::ProductAndTech);
        assert_eq!(specs[2].stage, StageId::Risk);
    }

    #[test]
    fn test_capability_sharing() {
        let specs = default_worker_specs();
        let data = spec_for_stage(&specs, StageId::Research).unwrap();
        let risk = spec_for_stage(&specs, StageId::Risk).unwrap();
        // Research and risk share the search capability set.
        assert_eq!(data.capability, risk.capability);
    }
}
