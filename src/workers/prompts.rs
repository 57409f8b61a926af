//! Instruction templates for the specialist workers.
//!
//! Templates are data rendered through tera; the variables come from the
//! coordinator's input slice for each stage. Prompt wording shapes analysis
//! quality, not orchestration behavior, so changes here never touch the
//! pipeline logic.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{DealdeskError, DealdeskResult};
use crate::workers::spec::WorkerSpec;

pub const DATA_ANALYST_TEMPLATE: &str = r#"Agent role: Startup Research Analyst.

Subject: {{ subject_label }}
{% if subject_website %}Website: {{ subject_website }}{% endif %}
{% if raw_idea %}Founder-provided idea: {{ raw_idea }}{% endif %}
{% if competitor_hints %}Known competitors: {{ competitor_hints | join(sep=", ") }}{% endif %}

Gather public information to support an investment decision. Perform varied
searches covering founders and team backgrounds, funding rounds and
investors, product and technology, target market and competitors, and
traction or recent news. Prefer reputable sources and recent data.

Return a single Research Briefing with these sections:
1. Company Overview
2. Founders & Key Team Members
3. Funding Status
4. Market & Competition (list 3-5 key competitors)
5. Product & Traction
6. Key Reference URLs

Base the briefing solely on collected results; do not invent facts. If a
section cannot be substantiated, say so explicitly.
"#;

pub const PRODUCT_AND_TECH_TEMPLATE: &str = r#"Agent role: Product & Technology Analyst.

Subject: {{ subject_label }}
{% if subject_website %}Website: {{ subject_website }}{% endif %}
{% if competitor_references %}Competitor references from research:
{% for ref in competitor_references %}- {{ ref }}
{% endfor %}{% endif %}

Research briefing from the prior stage:
{{ research_briefing }}

Conduct a deep product evaluation: walk the product surface, assess UX and
onboarding, infer the technology stack, and compare features against the
competitors listed above.

Return a structured Product & Technology assessment with sections for
product summary, user experience, technology stack, competitive feature
comparison, and notable gaps. Cite the pages you examined.
"#;

pub const RISK_ANALYST_TEMPLATE: &str = r#"Agent role: Risk Analyst.

Subject: {{ subject_label }}

Consolidated findings from the research and product stages:
{{ consolidated_findings }}

Produce a formal risk assessment of this startup. Evaluate market risk,
execution risk, team risk, technology risk, financial risk, and regulatory
exposure, grounded strictly in the findings above plus targeted searches to
verify open questions.

Return a structured breakdown with one subsection per risk category, each
containing severity (low/medium/high), rationale, and potential mitigants,
followed by a list of outright red flags if any exist.
"#;

/// Render a worker's instruction template with its input slice.
pub fn render_instruction(
    spec: &WorkerSpec,
    inputs: &HashMap<String, Value>,
) -> DealdeskResult<String> {
    let mut context = tera::Context::new();
    for (key, value) in inputs {
        context.insert(key, value);
    }
    tera::Tera::one_off(&spec.instruction_template, &context, false).map_err(|e| {
        DealdeskError::Template {
            worker: spec.id.clone(),
            reason: e.to_string(),
        }
    })
}
