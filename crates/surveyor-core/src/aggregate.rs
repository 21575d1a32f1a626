//! Merges per-step results into one combined outcome.
//!
//! A pure transform: same results in, bit-identical outcome out. Partial
//! success counts as success — one good step is enough. `merged_insights`
//! keeps duplicates (dedup is presentation, and presentation lives only in
//! the derived `summary` text).

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::StepResult;

/// The combined outcome of executing one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedOutcome {
    /// True iff at least one step succeeded.
    pub overall_success: bool,
    /// Every attempted step, success and failure alike, in plan order.
    pub results: Vec<StepResult>,
    /// Insights of successful steps concatenated in step order,
    /// duplicates preserved.
    pub merged_insights: Vec<String>,
    /// Sum of all step invocation times.
    pub total_elapsed: Duration,
    /// Deterministic, template-derived summary text.
    pub summary: String,
}

impl AggregatedOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Aggregates [`StepResult`]s. Stateless apart from the summary's insight
/// cap, so aggregation is freely repeatable.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    /// How many (deduplicated) insights the summary quotes.
    summary_insights: usize,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self { summary_insights: 5 }
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary_insights(summary_insights: usize) -> Self {
        Self { summary_insights }
    }

    /// Merge `results` into an [`AggregatedOutcome`].
    ///
    /// The module logic is never re-invoked here; everything derives from
    /// the recorded results.
    pub fn aggregate(&self, results: &[StepResult]) -> AggregatedOutcome {
        let succeeded = results.iter().filter(|r| r.success).count();
        let merged_insights: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.insights.iter().cloned())
            .collect();
        let total_elapsed: Duration = results.iter().map(|r| r.elapsed).sum();
        let summary = self.render_summary(results, succeeded, total_elapsed, &merged_insights);

        AggregatedOutcome {
            overall_success: succeeded > 0,
            results: results.to_vec(),
            merged_insights,
            total_elapsed,
            summary,
        }
    }

    fn render_summary(
        &self,
        results: &[StepResult],
        succeeded: usize,
        total_elapsed: Duration,
        insights: &[String],
    ) -> String {
        if results.is_empty() {
            return "No steps were executed.".to_string();
        }
        if succeeded == 0 {
            return format!(
                "All {} steps failed; no analysis results were produced.",
                results.len()
            );
        }

        let mut summary = format!(
            "{} of {} steps succeeded in {}ms.",
            succeeded,
            results.len(),
            total_elapsed.as_millis()
        );

        // First N distinct insights, first-occurrence order.
        let mut seen = HashSet::new();
        let shown: Vec<&str> = insights
            .iter()
            .filter(|i| seen.insert(i.as_str()))
            .take(self.summary_insights)
            .map(|i| i.as_str())
            .collect();
        if !shown.is_empty() {
            summary.push_str(" Key insights: ");
            summary.push_str(&shown.join("; "));
            summary.push('.');
        }
        summary
    }
}
