//! Module / data-source compatibility scoring.
//!
//! [`score`] decides whether a module can run against a source at all and
//! how well the source serves it. The verdict gates strategy generation;
//! the numeric score is purely a ranking signal. Pure function — recompute
//! on demand, never cache across data changes.
//!
//! Scoring policy (a deliberate product decision, not an implementation
//! detail):
//! * unsupported source kind fails closed at `0.0`;
//! * partial required-field coverage earns proportional credit capped at
//!   `0.5`, below any passing score;
//! * a passing pair starts at `0.5` and earns up to `0.5` more for
//!   optional-field coverage.

use serde::{Deserialize, Serialize};

use crate::registry::{DataSourceDescriptor, ModuleDescriptor};

/// Outcome of checking one (module, source) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Ranking signal in `[0, 1]`.
    pub score: f64,
    /// Whether the pair is usable at all.
    pub passed: bool,
    /// Required fields the source lacks, in declaration order.
    pub missing_fields: Vec<String>,
    /// Human-readable explanation of the verdict.
    pub reason: String,
}

/// Score `module` against `source`.
pub fn score(module: &ModuleDescriptor, source: &DataSourceDescriptor) -> CompatibilityResult {
    if !module.supported_source_kinds.contains(&source.kind) {
        return CompatibilityResult {
            score: 0.0,
            passed: false,
            missing_fields: module.required_fields.clone(),
            reason: format!(
                "source kind '{}' is not supported by module '{}'",
                source.kind, module.id
            ),
        };
    }

    let missing_fields: Vec<String> = module
        .required_fields
        .iter()
        .filter(|f| !source.available_fields.contains(*f))
        .cloned()
        .collect();

    if !module.required_fields.is_empty() && !missing_fields.is_empty() {
        let covered = module.required_fields.len() - missing_fields.len();
        let score = covered as f64 / module.required_fields.len() as f64 * 0.5;
        return CompatibilityResult {
            score,
            passed: false,
            reason: format!(
                "source '{}' lacks required fields: {}",
                source.id,
                missing_fields.join(", ")
            ),
            missing_fields,
        };
    }

    let optional_covered = module
        .optional_fields
        .iter()
        .filter(|f| source.available_fields.contains(*f))
        .count();
    let optional_total = module.optional_fields.len().max(1);
    let score = 0.5 + 0.5 * (optional_covered as f64 / optional_total as f64);

    CompatibilityResult {
        score,
        passed: true,
        missing_fields: Vec::new(),
        reason: format!(
            "all required fields available; {}/{} optional fields covered",
            optional_covered,
            module.optional_fields.len()
        ),
    }
}
