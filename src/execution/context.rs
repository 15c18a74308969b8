// Run Context
// Completed stage outputs plus the cooperative cancellation token.
// Owned by the executor; mutated only between stage attempts.

use crate::config::models::{resolve_path, StageCondition};

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, settable from outside the engine's call
/// stack (e.g. an interrupt handler). Checked at stage boundaries and
/// handed to the invoker for mid-call observation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; never un-sets.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// State visible to a stage while it runs
#[derive(Debug)]
pub struct RunContext {
    /// Parsed outputs of completed stages, by stage id
    outputs: HashMap<String, Map<String, Value>>,

    /// Cooperative cancellation signal for this run
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            outputs: HashMap::new(),
            cancel,
        }
    }

    /// Record a completed stage's parsed output
    pub fn record_output(&mut self, stage_id: impl Into<String>, parsed: Map<String, Value>) {
        self.outputs.insert(stage_id.into(), parsed);
    }

    /// Completed outputs, for template resolution
    pub fn outputs(&self) -> &HashMap<String, Map<String, Value>> {
        &self.outputs
    }

    /// Evaluate a skip condition. The field path is `stageId.path`
    /// against prior outputs; a bare `stageId` resolves to that stage's
    /// whole mapping. An unknown stage or path simply fails to resolve,
    /// which no operator except NotEquals treats as a match.
    pub fn evaluate_skip(&self, condition: &StageCondition) -> bool {
        match condition.field.split_once('.') {
            Some((stage_id, path)) => condition.evaluate(
                self.outputs
                    .get(stage_id)
                    .and_then(|parsed| resolve_path(parsed, path)),
            ),
            None => {
                let whole = self
                    .outputs
                    .get(&condition.field)
                    .cloned()
                    .map(Value::Object);
                condition.evaluate(whole.as_ref())
            }
        }
    }
}

/// Evaluate an early-exit condition against a stage's own parsed output
pub fn evaluate_early_exit(condition: &StageCondition, parsed: &Map<String, Value>) -> bool {
    condition.evaluate(resolve_path(parsed, &condition.field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ConditionOp;
    use serde_json::json;

    #[test]
    fn test_cancellation_is_sticky_and_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_skip_condition_over_prior_output() {
        let mut ctx = RunContext::new(CancellationToken::new());
        ctx.record_output(
            "triage",
            json!({"severity": "low"}).as_object().unwrap().clone(),
        );

        let matches = StageCondition {
            field: "triage.severity".to_string(),
            op: ConditionOp::Equals,
            value: Some(json!("low")),
        };
        assert!(ctx.evaluate_skip(&matches));

        let unknown_stage = StageCondition {
            field: "nope.severity".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(!ctx.evaluate_skip(&unknown_stage));
    }

    #[test]
    fn test_skip_condition_over_whole_stage() {
        let mut ctx = RunContext::new(CancellationToken::new());
        ctx.record_output(
            "triage",
            json!({"severity": "low"}).as_object().unwrap().clone(),
        );
        ctx.record_output("empty", Map::new());

        // A bare stage id resolves to the stage's whole mapping
        let exists = StageCondition {
            field: "triage".to_string(),
            op: ConditionOp::Exists,
            value: None,
        };
        assert!(ctx.evaluate_skip(&exists));

        let truthy = StageCondition {
            field: "triage".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(ctx.evaluate_skip(&truthy));

        // An empty mapping exists but is not truthy
        let empty_truthy = StageCondition {
            field: "empty".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(!ctx.evaluate_skip(&empty_truthy));
    }

    #[test]
    fn test_early_exit_over_own_output() {
        let parsed = json!({"confidence": 0.97, "done": true})
            .as_object()
            .unwrap()
            .clone();

        let condition = StageCondition {
            field: "done".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(evaluate_early_exit(&condition, &parsed));
    }
}
