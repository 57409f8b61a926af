//! Deterministic report assembly.
//!
//! Substitutes the three worker outputs verbatim into a fixed ten-section
//! memo skeleton. No semantic merging happens here: cross-references
//! between findings live inside the worker text, supplied in dependency
//! order by the coordinator.

use chrono::Utc;

use crate::error::{DealdeskError, DealdeskResult};
use crate::models::Report;
use crate::pipeline::run::PipelineRun;
use crate::workers::spec::{PRODUCT_OUTPUT_KEY, RESEARCH_OUTPUT_KEY, RISK_OUTPUT_KEY};

/// The fixed memo sections, in order. Every report contains each header
/// exactly once.
pub const SECTION_HEADERS: [&str; 10] = [
    "## 1. Executive Summary & Recommendation",
    "## 2. The Problem & The Solution",
    "## 3. Product & Technology Deep Dive",
    "## 4. Market Opportunity",
    "## 5. The Team",
    "## 6. Business Model & Go-to-Market",
    "## 7. Traction & Momentum",
    "## 8. Detailed Risk Analysis",
    "## 9. Conclusion",
    "## 10. Key References",
];

/// Assemble the final memo from a run whose stages have all completed.
///
/// Fails with `MissingSection` when a required output key is absent, which
/// can only happen if synthesis is invoked before the pipeline finished:
/// a sequencing bug, not a runtime tool failure.
pub fn synthesize(run: &PipelineRun) -> DealdeskResult<Report> {
    let research = require_output(run, RESEARCH_OUTPUT_KEY)?;
    let product = require_output(run, PRODUCT_OUTPUT_KEY)?;
    let risk = require_output(run, RISK_OUTPUT_KEY)?;

    let request = &run.request;
    let label = request.subject_label();

    let mut body = String::new();
    body.push_str(&format!("# Investment Memo: {}\n\n", label));

    // 1. Executive summary header material comes from the request itself.
    body.push_str(SECTION_HEADERS[0]);
    body.push_str("\n\n");
    body.push_str(&format!("- **Company:** {}\n", label));
    if let Some(website) = request.subject_website.as_deref() {
        body.push_str(&format!("- **Website:** {}\n", website));
    }
    if let Some(idea) = request.raw_idea.as_deref() {
        body.push_str(&format!("- **Founder-provided idea:** {}\n", idea));
    }
    if !request.competitor_hints.is_empty() {
        body.push_str(&format!(
            "- **Caller-supplied competitors:** {}\n",
            request.competitor_hints.join(", ")
        ));
    }
    body.push_str(
        "\nThe thesis and recommendation follow from the specialist \
         assessments in the sections below.\n\n",
    );

    // 2. Research briefing, verbatim.
    push_section(&mut body, SECTION_HEADERS[1], &research.body);

    // 3. Product and technology assessment, verbatim.
    push_section(&mut body, SECTION_HEADERS[2], &product.body);

    // 4-7. Pointer sections: the material lives in the research briefing
    // (section 2); repeating it here would require semantic merging, which
    // is deliberately out of scope for the synthesizer.
    push_section(
        &mut body,
        SECTION_HEADERS[3],
        "Market sizing, trends, and dynamics are covered in the research briefing (section 2).",
    );
    push_section(
        &mut body,
        SECTION_HEADERS[4],
        "Founder and key-team findings are covered in the research briefing (section 2).",
    );
    push_section(
        &mut body,
        SECTION_HEADERS[5],
        "Revenue model and go-to-market findings are covered in the research briefing (section 2).",
    );
    push_section(
        &mut body,
        SECTION_HEADERS[6],
        "Traction signals and funding history are covered in the research briefing (section 2).",
    );

    // 8. Risk assessment, verbatim.
    push_section(&mut body, SECTION_HEADERS[7], &risk.body);

    // 9-10. Closing material.
    push_section(
        &mut body,
        SECTION_HEADERS[8],
        "This memo was assembled verbatim from the specialist assessments above. \
         The risk analysis in section 8 governs the final recommendation.",
    );
    push_section(
        &mut body,
        SECTION_HEADERS[9],
        "Source URLs are embedded in the research briefing (section 2) and the \
         product deep dive (section 3).",
    );

    log::info!(
        "[Synthesizer] assembled memo for run {} ({} chars)",
        run.id,
        body.len()
    );

    Ok(Report {
        run_id: run.id.clone(),
        body,
        generated_at: Utc::now(),
    })
}

fn require_output<'a>(
    run: &'a PipelineRun,
    output_key: &str,
) -> DealdeskResult<&'a crate::models::WorkerOutput> {
    run.output(output_key).ok_or_else(|| DealdeskError::MissingSection {
        output_key: output_key.to_string(),
    })
}

fn push_section(body: &mut String, header: &str, content: &str) {
    body.push_str(header);
    body.push_str("\n\n");
    body.push_str(content.trim_end());
    body.push_str("\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::models::{AnalysisRequest, WorkerOutput};
    use crate::tools::broker::ToolBroker;
    use std::time::Duration;

    fn run_with_outputs(outputs: Vec<WorkerOutput>) -> PipelineRun {
        let broker = ToolBroker::new(
            CapabilityRegistry::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let mut run = PipelineRun::new(
            AnalysisRequest::for_company("Acme", Some("acme.example".to_string())),
            broker,
        );
        for output in outputs {
            run.record_output(output);
        }
        run
    }

    fn complete_outputs() -> Vec<WorkerOutput> {
        vec![
            WorkerOutput::new(RESEARCH_OUTPUT_KEY, "RESEARCH_OK"),
            WorkerOutput::new(PRODUCT_OUTPUT_KEY, "PRODUCT_OK"),
            WorkerOutput::new(RISK_OUTPUT_KEY, "RISK_OK"),
        ]
    }

    #[test]
    fn test_all_headers_once_in_order() {
        let run = run_with_outputs(complete_outputs());
        let report = synthesize(&run).unwrap();

        let mut last_index = 0;
        for header in SECTION_HEADERS {
            assert_eq!(
                report.body.matches(header).count(),
                1,
                "header '{}' must appear exactly once",
                header
            );
            let index = report.body.find(header).unwrap();
            assert!(index > last_index, "header '{}' out of order", header);
            last_index = index;
        }
    }

    #[test]
    fn test_fragments_in_relative_order() {
        let run = run_with_outputs(complete_outputs());
        let report = synthesize(&run).unwrap();

        let research = report.body.find("RESEARCH_OK").unwrap();
        let product = report.body.find("PRODUCT_OK").unwrap();
        let risk = report.body.find("RISK_OK").unwrap();
        assert!(research < product);
        assert!(product < risk);
    }

    #[test]
    fn test_missing_output_fails_without_partial_synthesis() {
        let run = run_with_outputs(vec![WorkerOutput::new(RESEARCH_OUTPUT_KEY, "RESEARCH_OK")]);
        let err = synthesize(&run).unwrap_err();
        match err {
            DealdeskError::MissingSection { output_key } => {
                assert_eq!(output_key, PRODUCT_OUTPUT_KEY);
            }
            other => panic!("expected MissingSection, got {:?}", other),
        }
    }

    #[test]
    fn test_request_fields_surface_in_summary() {
        let broker = ToolBroker::new(
            CapabilityRegistry::default(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let mut request = AnalysisRequest::for_company("Acme", Some("acme.example".to_string()));
        request.competitor_hints = vec!["Globex".to_string(), "Initech".to_string()];
        let mut run = PipelineRun::new(request, broker);
        for output in complete_outputs() {
            run.record_output(output);
        }

        let report = synthesize(&run).unwrap();
        assert!(report.body.contains("acme.example"));
        assert!(report.body.contains("Globex, Initech"));
        assert_eq!(report.run_id, run.id);
    }
}
