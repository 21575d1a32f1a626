//! Derives follow-up intents from an aggregated outcome.
//!
//! Rule-based inspection, nothing clever: a successful step whose payload
//! carries no visualization is worth charting, a step whose insights flag
//! missing values is worth a cleaning pass, and a fully failed outcome
//! falls back to the least demanding analysis. The output is *intents* —
//! they re-enter the strategy generator for a fresh planning cycle, which
//! keeps the planner stateless and the feedback loop explicit.

use serde_json::{json, Value};
use tracing::debug;

use crate::aggregate::AggregatedOutcome;
use crate::engine::StepResult;
use crate::intent::Intent;

/// Insight substring that marks a data-quality problem worth a cleaning
/// follow-up. Matched case-insensitively.
pub const MISSING_VALUE_MARKER: &str = "missing value";

/// Payload key a module sets when it produced a visualization.
pub const VISUALIZATION_KEY: &str = "visualization";

/// Inspect `outcome` and propose intents for the next planning cycle.
pub fn followups(outcome: &AggregatedOutcome) -> Vec<Intent> {
    if !outcome.overall_success {
        // Nothing worked; retry with the most basic analysis instead of
        // amplifying a broken cycle.
        return vec![fallback_intent()];
    }

    let mut intents = Vec::new();
    for result in outcome.results.iter().filter(|r| r.success) {
        if !has_visualization(&result.payload) {
            intents.push(visualization_intent(result));
        }
        if result
            .insights
            .iter()
            .any(|i| i.to_lowercase().contains(MISSING_VALUE_MARKER))
        {
            intents.push(cleaning_intent(result));
        }
    }

    debug!(count = intents.len(), "derived follow-up intents");
    intents
}

/// Whether `payload` carries a non-empty visualization marker.
fn has_visualization(payload: &Value) -> bool {
    match payload.get(VISUALIZATION_KEY) {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

fn visualization_intent(result: &StepResult) -> Intent {
    Intent::new(format!("visualize {} results", result.module_id))
        .with_flag("action", json!("visualize"))
        .with_parameter("data_source", json!(result.source_id))
        .with_parameter("chart_types", json!(["histogram", "scatter", "correlation"]))
}

fn cleaning_intent(result: &StepResult) -> Intent {
    Intent::new(format!("clean missing values in {}", result.source_id))
        .with_flag("action", json!("clean"))
        .with_parameter("data_source", json!(result.source_id))
        .with_parameter("focus", json!("missing_values"))
}

fn fallback_intent() -> Intent {
    Intent::new("basic description of available data")
        .with_flag("action", json!("analyze"))
        .with_flag("fallback", json!(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::engine::{StepError, StepErrorKind};
    use chrono::Utc;
    use std::time::Duration;

    fn step_result(step_id: u64, success: bool, payload: Value, insights: &[&str]) -> StepResult {
        StepResult {
            step_id,
            module_id: format!("m{step_id}"),
            source_id: format!("s{step_id}"),
            success,
            payload,
            insights: insights.iter().map(|s| s.to_string()).collect(),
            elapsed: Duration::from_millis(1),
            started_at: Utc::now(),
            error: if success {
                None
            } else {
                Some(StepError {
                    kind: StepErrorKind::InvocationError,
                    message: "boom".to_string(),
                })
            },
        }
    }

    fn outcome_of(results: Vec<StepResult>) -> AggregatedOutcome {
        ResultAggregator::new().aggregate(&results)
    }

    #[test]
    fn test_missing_visualization_yields_visualization_intent() {
        let outcome = outcome_of(vec![step_result(1, true, json!({"rows": 5}), &[])]);
        let intents = followups(&outcome);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].flags["action"], json!("visualize"));
        assert_eq!(intents[0].parameters["data_source"], json!("s1"));
    }

    #[test]
    fn test_present_visualization_yields_no_intent() {
        let payload = json!({"rows": 5, "visualization": {"kind": "histogram"}});
        let outcome = outcome_of(vec![step_result(1, true, payload, &[])]);
        assert!(followups(&outcome).is_empty());
    }

    #[test]
    fn test_empty_visualization_object_counts_as_absent() {
        let payload = json!({"visualization": {}});
        let outcome = outcome_of(vec![step_result(1, true, payload, &[])]);
        assert_eq!(followups(&outcome).len(), 1);
    }

    #[test]
    fn test_missing_value_insight_yields_cleaning_intent() {
        let payload = json!({"visualization": {"kind": "bar"}});
        let outcome = outcome_of(vec![step_result(
            1,
            true,
            payload,
            &["column 'date' has 14% Missing Values"],
        )]);
        let intents = followups(&outcome);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].flags["action"], json!("clean"));
        assert_eq!(intents[0].parameters["focus"], json!("missing_values"));
    }

    #[test]
    fn test_failed_steps_produce_no_per_step_followups() {
        let outcome = outcome_of(vec![
            step_result(1, true, json!({"visualization": "chart.svg"}), &[]),
            step_result(2, false, json!(null), &["missing values everywhere"]),
        ]);
        assert!(followups(&outcome).is_empty());
    }

    #[test]
    fn test_all_failed_outcome_yields_single_fallback() {
        let outcome = outcome_of(vec![
            step_result(1, false, json!(null), &[]),
            step_result(2, false, json!(null), &[]),
        ]);
        let intents = followups(&outcome);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].flags["fallback"], json!(true));
    }

    #[test]
    fn test_one_step_can_trigger_both_rules() {
        let outcome = outcome_of(vec![step_result(
            1,
            true,
            json!({"rows": 2}),
            &["missing values in 'region'"],
        )]);
        let intents = followups(&outcome);
        assert_eq!(intents.len(), 2);
    }
}
