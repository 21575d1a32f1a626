//! Candidate strategy generation and ranking.
//!
//! The generator enumerates (module, source) pairs, drops pairs the
//! compatibility scorer rejects, derives one or more parameter candidates
//! per surviving pair, scores each candidate and returns a ranked,
//! size-bounded strategy list. Output is fully deterministic: equal
//! priorities break by ascending `(module_id, source_id)`, and candidate
//! fan-out order is fixed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::compat::{self, CompatibilityResult};
use crate::intent::{Intent, IntentMatcher, KeywordMatcher};
use crate::registry::{
    DataSourceDescriptor, ModuleDescriptor, ParameterMap, ParameterType, Registry,
};

/// One ranked candidate: a module, a source, resolved parameters and the
/// scores that justify its rank. Never mutated after creation — a changed
/// strategy is a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub module_id: String,
    pub source_id: String,
    pub parameters: ParameterMap,
    pub compatibility: CompatibilityResult,
    /// Rank in `[0, 100]`, higher first.
    pub priority: u8,
    /// Informational cost estimate; never used for ranking.
    pub estimated_cost: Option<f64>,
    /// Keys (`"module_id:source_id"`) of strategies this one must follow.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Strategy {
    /// The key other strategies use to depend on this one.
    pub fn key(&self) -> String {
        format!("{}:{}", self.module_id, self.source_id)
    }

    /// Copy of this strategy with dependency keys attached.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Generates ranked [`Strategy`] lists from an intent and the registered
/// capabilities.
pub struct StrategyGenerator {
    matcher: Box<dyn IntentMatcher>,
    min_score: f64,
}

impl Default for StrategyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyGenerator {
    /// Generator with the default keyword matcher and no score floor.
    pub fn new() -> Self {
        Self {
            matcher: Box::new(KeywordMatcher),
            min_score: 0.0,
        }
    }

    /// Swap in a custom intent matcher.
    pub fn with_matcher(matcher: Box<dyn IntentMatcher>) -> Self {
        Self {
            matcher,
            min_score: 0.0,
        }
    }

    /// Drop pairs whose compatibility score falls below `min_score`, even
    /// when they pass. Defaults to `0.0` (the verdict alone gates).
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Generate up to `max_strategies` strategies, ranked descending by
    /// priority. An empty result is a valid answer, not an error.
    pub fn generate(
        &self,
        intent: &Intent,
        modules: &[ModuleDescriptor],
        sources: &[DataSourceDescriptor],
        max_strategies: usize,
    ) -> Vec<Strategy> {
        let mut strategies = Vec::new();

        for module in modules {
            let intent_match = self.matcher.score(intent, module).clamp(0.0, 1.0);
            let order_bonus = order_bonus(intent, &module.id);

            for source in sources {
                let compatibility = compat::score(module, source);
                if !compatibility.passed {
                    continue;
                }
                if compatibility.score < self.min_score {
                    debug!(
                        module_id = %module.id,
                        source_id = %source.id,
                        score = compatibility.score,
                        "pair passed but fell below minimum score"
                    );
                    continue;
                }

                let estimated_cost = estimate_cost(module, source);
                for parameters in parameter_candidates(module, intent, source) {
                    let completeness = parameter_completeness(module, &parameters);
                    let base = (compatibility.score * 50.0).round() as i64
                        + (intent_match * 30.0).round() as i64
                        + (completeness * 20.0).round() as i64;
                    let priority = (base.clamp(0, 100) + order_bonus).clamp(0, 100) as u8;

                    strategies.push(Strategy {
                        module_id: module.id.clone(),
                        source_id: source.id.clone(),
                        parameters,
                        compatibility: compatibility.clone(),
                        priority,
                        estimated_cost: Some(estimated_cost),
                        dependencies: Vec::new(),
                    });
                }
            }
        }

        strategies.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.module_id.cmp(&b.module_id))
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        strategies.truncate(max_strategies);

        debug!(
            count = strategies.len(),
            intent = %intent.descriptive_text,
            "generated strategies"
        );
        strategies
    }

    /// [`generate`](Self::generate) over everything in `registry`.
    pub fn generate_from_registry(
        &self,
        intent: &Intent,
        registry: &Registry,
        max_strategies: usize,
    ) -> Vec<Strategy> {
        let modules: Vec<ModuleDescriptor> = registry.modules().cloned().collect();
        let sources: Vec<DataSourceDescriptor> = registry.sources().cloned().collect();
        self.generate(intent, &modules, &sources, max_strategies)
    }
}

/// Bonus for modules the intent orders explicitly: earlier entries earn
/// more, ten points per position from the back of the list.
fn order_bonus(intent: &Intent, module_id: &str) -> i64 {
    intent
        .module_order
        .iter()
        .position(|m| m == module_id)
        .map(|pos| ((intent.module_order.len() - pos) * 10) as i64)
        .unwrap_or(0)
}

/// Derive parameter candidates for one pair.
///
/// Every candidate starts from the source's connection handle plus the
/// intent's explicit parameters, then fills schema parameters from source
/// metadata and defaults. Booleans with no derivable value fan out into a
/// true and a false candidate — a deliberate widening, not a guess.
fn parameter_candidates(
    module: &ModuleDescriptor,
    intent: &Intent,
    source: &DataSourceDescriptor,
) -> Vec<ParameterMap> {
    let mut base = ParameterMap::new();
    base.insert(
        "data_source".to_string(),
        Value::String(source.connection_info.clone()),
    );
    for (key, value) in &intent.parameters {
        base.insert(key.clone(), value.clone());
    }

    let mut candidates = vec![base];
    for (name, spec) in &module.parameter_schema {
        // Fan-out keeps key sets identical across candidates, so checking
        // the first is checking them all.
        if candidates[0].contains_key(name) {
            continue;
        }

        if let Some(value) = derive_from_source(name, spec.param_type, source) {
            for candidate in &mut candidates {
                candidate.insert(name.clone(), value.clone());
            }
        } else if let Some(default) = &spec.default {
            for candidate in &mut candidates {
                candidate.insert(name.clone(), default.clone());
            }
        } else if spec.param_type == ParameterType::Boolean {
            let mut expanded = Vec::with_capacity(candidates.len() * 2);
            for candidate in candidates {
                let mut on = candidate.clone();
                on.insert(name.clone(), Value::Bool(true));
                let mut off = candidate;
                off.insert(name.clone(), Value::Bool(false));
                expanded.push(on);
                expanded.push(off);
            }
            candidates = expanded;
        }
    }
    candidates
}

/// Match a `*_field` parameter against the source's field names, e.g. a
/// `date_field` parameter picks up an available `date` column.
fn derive_from_source(
    name: &str,
    param_type: ParameterType,
    source: &DataSourceDescriptor,
) -> Option<Value> {
    if param_type != ParameterType::String {
        return None;
    }
    let field = name.strip_suffix("_field")?;
    source
        .available_fields
        .iter()
        .find(|f| f.as_str() == field)
        .map(|f| Value::String(f.clone()))
}

/// Fraction of required schema parameters present in `parameters`.
fn parameter_completeness(module: &ModuleDescriptor, parameters: &ParameterMap) -> f64 {
    let required: Vec<&String> = module
        .parameter_schema
        .iter()
        .filter(|(_, spec)| spec.required)
        .map(|(name, _)| name)
        .collect();
    if required.is_empty() {
        return 1.0;
    }
    let satisfied = required
        .iter()
        .filter(|name| parameters.contains_key(**name))
        .count();
    satisfied as f64 / required.len() as f64
}

/// Rough relative cost of running `module` against `source`: large sources
/// and heavyweight module descriptions push the estimate up.
fn estimate_cost(module: &ModuleDescriptor, source: &DataSourceDescriptor) -> f64 {
    let mut base = 1.0;
    if let Some(size) = source.size_hint {
        if size > 1_000_000 {
            base *= 3.0;
        } else if size > 100_000 {
            base *= 2.0;
        }
    }

    let description = module.description.to_lowercase();
    let complexity_hits = ["visualization", "machine_learning", "statistical"]
        .iter()
        .filter(|marker| description.contains(*marker))
        .count();

    base * (1.0 + complexity_hits as f64 * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParameterSpec;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn module(id: &str, kinds: &[&str], required: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor {
            id: id.to_string(),
            name: id.replace('_', " "),
            description: String::new(),
            supported_source_kinds: kinds.iter().map(|s| s.to_string()).collect(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            optional_fields: Vec::new(),
            parameter_schema: BTreeMap::new(),
        }
    }

    fn source(id: &str, kind: &str, fields: &[&str]) -> DataSourceDescriptor {
        DataSourceDescriptor {
            id: id.to_string(),
            kind: kind.to_string(),
            available_fields: fields.iter().map(|s| s.to_string()).collect(),
            connection_info: format!("data/{id}"),
            size_hint: None,
        }
    }

    #[test]
    fn test_single_compatible_pair_yields_one_strategy() {
        let m1 = module("sales_summary", &["csv"], &["sales"]);
        let s1 = source("s1", "csv", &["sales", "date"]);
        let intent = Intent::new("sales");

        let strategies = StrategyGenerator::new().generate(&intent, &[m1], &[s1], 5);
        assert_eq!(strategies.len(), 1);
        assert!(strategies[0].compatibility.passed);
        assert_eq!(strategies[0].module_id, "sales_summary");
        assert_eq!(strategies[0].source_id, "s1");
    }

    #[test]
    fn test_missing_required_field_yields_no_strategies() {
        let m1 = module("sales_summary", &["csv"], &["sales"]);
        let s1 = source("s1", "csv", &["date"]);
        let intent = Intent::new("sales");

        let strategies = StrategyGenerator::new().generate(&intent, &[m1], &[s1], 5);
        assert!(strategies.is_empty());
    }

    #[test]
    fn test_output_sorted_by_priority_with_id_tie_break() {
        // Same compatibility everywhere; intent matches only "trend".
        let modules = vec![
            module("zeta", &["csv"], &[]),
            module("trend", &["csv"], &[]),
            module("alpha", &["csv"], &[]),
        ];
        let sources = vec![source("s2", "csv", &[]), source("s1", "csv", &[])];
        let intent = Intent::new("trend");

        let strategies = StrategyGenerator::new().generate(&intent, &modules, &sources, 10);
        let keys: Vec<String> = strategies.iter().map(|s| s.key()).collect();
        assert_eq!(
            keys,
            vec![
                "trend:s1", "trend:s2", // higher priority via intent match
                "alpha:s1", "alpha:s2", "zeta:s1", "zeta:s2",
            ]
        );
        assert!(strategies.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn test_result_is_truncated_to_max_strategies() {
        let modules = vec![module("a", &["csv"], &[]), module("b", &["csv"], &[])];
        let sources = vec![source("s1", "csv", &[]), source("s2", "csv", &[])];
        let strategies =
            StrategyGenerator::new().generate(&Intent::new("x"), &modules, &sources, 3);
        assert_eq!(strategies.len(), 3);
    }

    #[test]
    fn test_boolean_parameter_fans_out_two_candidates() {
        let mut m = module("describe", &["csv"], &[]);
        m.parameter_schema.insert(
            "include_nulls".to_string(),
            ParameterSpec {
                param_type: ParameterType::Boolean,
                default: None,
                required: true,
            },
        );
        let strategies = StrategyGenerator::new().generate(
            &Intent::new("describe"),
            &[m],
            &[source("s1", "csv", &[])],
            10,
        );
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].parameters["include_nulls"], json!(true));
        assert_eq!(strategies[1].parameters["include_nulls"], json!(false));
    }

    #[test]
    fn test_intent_parameter_beats_schema_default() {
        let mut m = module("describe", &["csv"], &[]);
        m.parameter_schema.insert(
            "limit".to_string(),
            ParameterSpec {
                param_type: ParameterType::Integer,
                default: Some(json!(100)),
                required: true,
            },
        );
        let intent = Intent::new("describe").with_parameter("limit", json!(10));
        let strategies =
            StrategyGenerator::new().generate(&intent, &[m], &[source("s1", "csv", &[])], 10);
        assert_eq!(strategies[0].parameters["limit"], json!(10));
    }

    #[test]
    fn test_field_suffixed_parameter_derives_from_source_metadata() {
        let mut m = module("trend", &["csv"], &[]);
        m.parameter_schema.insert(
            "date_field".to_string(),
            ParameterSpec {
                param_type: ParameterType::String,
                default: None,
                required: true,
            },
        );
        let strategies = StrategyGenerator::new().generate(
            &Intent::new("trend"),
            &[m],
            &[source("s1", "csv", &["date", "sales"])],
            10,
        );
        assert_eq!(strategies[0].parameters["date_field"], json!("date"));
    }

    #[test]
    fn test_candidates_are_seeded_with_source_connection() {
        let strategies = StrategyGenerator::new().generate(
            &Intent::new("x"),
            &[module("a", &["csv"], &[])],
            &[source("s1", "csv", &[])],
            10,
        );
        assert_eq!(strategies[0].parameters["data_source"], json!("data/s1"));
    }

    #[test]
    fn test_missing_required_parameter_lowers_priority() {
        let plain = module("a", &["csv"], &[]);
        let mut demanding = module("a", &["csv"], &[]);
        demanding.parameter_schema.insert(
            "window".to_string(),
            ParameterSpec {
                param_type: ParameterType::Integer,
                default: None,
                required: true,
            },
        );

        let gen = StrategyGenerator::new();
        let intent = Intent::new("unrelated");
        let full = gen.generate(&intent, &[plain], &[source("s1", "csv", &[])], 1);
        let partial = gen.generate(&intent, &[demanding], &[source("s1", "csv", &[])], 1);
        assert!(full[0].priority > partial[0].priority);
    }

    #[test]
    fn test_module_order_bonus_outranks_tied_base_priority() {
        let modules = vec![module("alpha", &["csv"], &[]), module("beta", &["csv"], &[])];
        let sources = vec![source("s1", "csv", &[])];
        let intent = Intent::new("unrelated")
            .with_module_order(vec!["beta".to_string(), "alpha".to_string()]);

        let strategies = StrategyGenerator::new().generate(&intent, &modules, &sources, 10);
        assert_eq!(strategies[0].module_id, "beta");
        assert_eq!(strategies[1].module_id, "alpha");
        assert!(strategies[0].priority > strategies[1].priority);
    }

    #[test]
    fn test_min_score_filters_weak_pairs() {
        let mut m = module("a", &["csv"], &[]);
        m.optional_fields = vec!["date".to_string(), "region".to_string()];
        // No optional coverage: score is exactly 0.5.
        let strategies = StrategyGenerator::new().with_min_score(0.6).generate(
            &Intent::new("a"),
            &[m],
            &[source("s1", "csv", &[])],
            10,
        );
        assert!(strategies.is_empty());
    }

    #[test]
    fn test_priority_formula_matches_hand_computation() {
        // compat 1.0 (no required, full optional), match 1.0, completeness 1.0
        let mut m = module("trend", &["csv"], &[]);
        m.optional_fields = vec!["date".to_string()];
        let strategies = StrategyGenerator::new().generate(
            &Intent::new("trend"),
            &[m],
            &[source("s1", "csv", &["date"])],
            10,
        );
        assert_eq!(strategies[0].priority, 100);
    }

    #[test]
    fn test_estimated_cost_scales_with_source_size_and_description() {
        let mut m = module("viz", &["csv"], &[]);
        m.description = "statistical visualization of trends".to_string();
        let mut s = source("s1", "csv", &[]);
        s.size_hint = Some(2_000_000);

        let strategies =
            StrategyGenerator::new().generate(&Intent::new("viz"), &[m], &[s], 10);
        // base 1.0 * 3.0 (size) * (1.0 + 2 * 0.5) = 6.0
        assert_eq!(strategies[0].estimated_cost, Some(6.0));
    }
}
