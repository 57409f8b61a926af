//! Generic worker turn runner.
//!
//! Drives one bounded reasoning turn: render the instruction, alternate
//! between reasoner decisions and tool calls, terminate with exactly one
//! worker output. The cycle ceiling is enforced here, independent of the
//! reasoning process's own judgment about when to stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use crate::error::{DealdeskError, DealdeskResult};
use crate::models::WorkerOutput;
use crate::tools::broker::ToolBroker;
use crate::workers::prompts::render_instruction;
use crate::workers::reasoner::{Reasoner, ReasonerStep, TranscriptEntry};
use crate::workers::spec::WorkerSpec;

/// Body substituted when the reasoner finishes a turn with blank text.
/// Content quality is outside this core's control; an empty answer is a
/// degraded success, not a stage failure.
const EMPTY_BODY_PLACEHOLDER: &str = "(the specialist reported no findings)";

/// Shared cancellation flag for a pipeline run.
///
/// Cloned into whatever task needs to request cancellation; the runner
/// checks it at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execute one worker turn.
///
/// Returns the worker's single output, or a stage-fatal error
/// (`TurnBudgetExceeded`, required-capability `ConnectionStart`,
/// `Reasoner`, `Cancelled`). Degraded tool results never surface as
/// errors; they are fed back into the transcript for the reasoner to work
/// around.
pub async fn run_worker(
    spec: &WorkerSpec,
    inputs: &HashMap<String, Value>,
    reasoner: &dyn Reasoner,
    broker: &mut ToolBroker,
    max_tool_cycles: u32,
    reasoner_timeout: Duration,
    cancel: &CancelFlag,
) -> DealdeskResult<WorkerOutput> {
    let instruction = render_instruction(spec, inputs)?;
    let mut transcript = vec![TranscriptEntry::Instruction(instruction)];
    let mut cycles_used: u32 = 0;

    log::info!(
        "[Worker {}] starting turn (budget: {} tool cycles)",
        spec.id,
        max_tool_cycles
    );

    loop {
        if cancel.is_set() {
            log::info!("[Worker {}] cancelled", spec.id);
            return Err(DealdeskError::Cancelled { stage: spec.stage });
        }

        let step = match timeout(reasoner_timeout, reasoner.next_step(&spec.id, &transcript)).await
        {
            Ok(step) => step?,
            Err(_) => {
                return Err(DealdeskError::Reasoner(format!(
                    "no decision within {:?} for worker '{}'",
                    reasoner_timeout, spec.id
                )))
            }
        };

        match step {
            ReasonerStep::Final(text) => {
                let body = if text.trim().is_empty() {
                    log::warn!("[Worker {}] empty final answer, degrading", spec.id);
                    EMPTY_BODY_PLACEHOLDER.to_string()
                } else {
                    text
                };
                log::info!(
                    "[Worker {}] finished after {} tool cycles ({} chars)",
                    spec.id,
                    cycles_used,
                    body.len()
                );
                return Ok(WorkerOutput::new(&spec.output_key, body));
            }
            ReasonerStep::ToolCall(call) => {
                if cycles_used >= max_tool_cycles {
                    return Err(DealdeskError::TurnBudgetExceeded {
                        worker: spec.id.clone(),
                        budget: max_tool_cycles,
                    });
                }
                cycles_used += 1;

                if cancel.is_set() {
                    return Err(DealdeskError::Cancelled { stage: spec.stage });
                }

                log::debug!(
                    "[Worker {}] cycle {}/{}: tool '{}'",
                    spec.id,
                    cycles_used,
                    max_tool_cycles,
                    call.tool_name
                );
                transcript.push(TranscriptEntry::ToolCall {
                    tool_name: call.tool_name.clone(),
                    arguments: serde_json::to_value(&call.arguments)
                        .unwrap_or(Value::Null),
                });

                let result = broker.invoke(&spec.capability, call).await?;
                if !result.is_ok() {
                    log::warn!(
                        "[Worker {}] degraded tool result ({:?}): {}",
                        spec.id,
                        result.status,
                        result.payload_text()
                    );
                }
                transcript.push(TranscriptEntry::ToolResult {
                    tool_name: result.call.tool_name.clone(),
                    status: result.status,
                    payload: result.payload_text(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityRegistry, CapabilitySet};
    use crate::tools::protocol::ToolCall;
    use crate::workers::spec::default_worker_specs;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const ECHO_SERVER: &str = r#"
echo '{"event":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  printf '{"id":%s,"status":"ok","payload":"echoed"}\n' "$id"
done
"#;

    /// Test double that replays a fixed sequence of steps.
    struct ScriptedReasoner {
        steps: Mutex<Vec<ReasonerStep>>,
    }

    impl ScriptedReasoner {
        fn new(mut steps: Vec<ReasonerStep>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
            }
        }

        fn always_tool_calls() -> Self {
            Self {
                steps: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        async fn next_step(
            &self,
            _worker_id: &str,
            _transcript: &[TranscriptEntry],
        ) -> DealdeskResult<ReasonerStep> {
            let mut steps = self.steps.lock().unwrap();
            Ok(steps
                .pop()
                .unwrap_or_else(|| ReasonerStep::ToolCall(ToolCall::new("web_search"))))
        }
    }

    fn test_broker() -> ToolBroker {
        let registry = CapabilityRegistry::new(vec![CapabilitySet::new(
            "search",
            "sh",
            vec!["-c".to_string(), ECHO_SERVER.to_string()],
        )
        .with_call_timeout(2)]);
        ToolBroker::new(registry, Duration::from_secs(5), Duration::from_secs(1))
    }

    fn research_inputs() -> HashMap<String, Value> {
        let mut inputs = HashMap::new();
        inputs.insert("subject_label".to_string(), json!("Acme"));
        inputs.insert("subject_website".to_string(), json!("acme.example"));
        inputs.insert("raw_idea".to_string(), json!(null));
        inputs.insert("competitor_hints".to_string(), json!([]));
        inputs
    }

    fn research_spec() -> WorkerSpec {
        default_worker_specs().remove(0)
    }

    #[tokio::test]
    async fn test_turn_with_tool_calls_then_final() {
        let spec = research_spec();
        let reasoner = ScriptedReasoner::new(vec![
            ReasonerStep::ToolCall(ToolCall::new("web_search").with_arg("query", "Acme")),
            ReasonerStep::ToolCall(ToolCall::new("fetch_url").with_arg("url", "acme.example")),
            ReasonerStep::Final("RESEARCH_OK".to_string()),
        ]);
        let mut broker = test_broker();

        let output = run_worker(
            &spec,
            &research_inputs(),
            &reasoner,
            &mut broker,
            5,
            Duration::from_secs(5),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.output_key, "research_briefing_output");
        assert_eq!(output.body, "RESEARCH_OK");
        assert_eq!(broker.total_invocations(), 2);
        broker.close_all().await;
    }

    #[tokio::test]
    async fn test_turn_budget_exceeded() {
        let spec = research_spec();
        let reasoner = ScriptedReasoner::always_tool_calls();
        let mut broker = test_broker();

        let err = run_worker(
            &spec,
            &research_inputs(),
            &reasoner,
            &mut broker,
            3,
            Duration::from_secs(5),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

        match err {
            DealdeskError::TurnBudgetExceeded { worker, budget } => {
                assert_eq!(worker, "data_analyst");
                assert_eq!(budget, 3);
            }
            other => panic!("expected TurnBudgetExceeded, got {:?}", other),
        }
        // Exactly the budgeted number of calls went out before the abort.
        assert_eq!(broker.total_invocations(), 3);
        broker.close_all().await;
    }

    #[tokio::test]
    async fn test_empty_final_answer_degrades_to_placeholder() {
        let spec = research_spec();
        let reasoner = ScriptedReasoner::new(vec![ReasonerStep::Final("   \n".to_string())]);
        let mut broker = test_broker();

        let output = run_worker(
            &spec,
            &research_inputs(),
            &reasoner,
            &mut broker,
            5,
            Duration::from_secs(5),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert!(!output.body.trim().is_empty());
        assert_eq!(output.body, EMPTY_BODY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_cancel_before_first_decision() {
        let spec = research_spec();
        let reasoner = ScriptedReasoner::new(vec![ReasonerStep::Final("unused".to_string())]);
        let mut broker = test_broker();
        let cancel = CancelFlag::new();
        cancel.set();

        let err = run_worker(
            &spec,
            &research_inputs(),
            &reasoner,
            &mut broker,
            5,
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DealdeskError::Cancelled { .. }));
        assert_eq!(broker.total_invocations(), 0);
    }

    #[tokio::test]
    async fn test_stalled_reasoner_hits_decision_timeout() {
        struct StalledReasoner;

        #[async_trait]
        impl Reasoner for StalledReasoner {
            async fn next_step(
                &self,
                _worker_id: &str,
                _transcript: &[TranscriptEntry],
            ) -> DealdeskResult<ReasonerStep> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(ReasonerStep::Final("never".to_string()))
            }
        }

        let spec = research_spec();
        let mut broker = test_broker();
        let err = run_worker(
            &spec,
            &research_inputs(),
            &StalledReasoner,
            &mut broker,
            5,
            Duration::from_millis(100),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DealdeskError::Reasoner(_)));
    }
}
