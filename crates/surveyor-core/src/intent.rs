//! Inbound intent record and the pluggable intent-match seam.
//!
//! Intents arrive pre-structured from an external recognition collaborator;
//! this core never parses free text. How well an intent matches a module is
//! a deliberately pluggable measure: implement [`IntentMatcher`] to swap in
//! a smarter scorer. The default [`KeywordMatcher`] is a deterministic
//! token-overlap heuristic — good enough for ranking, cheap enough for the
//! hot path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{ModuleDescriptor, ParameterMap};

/// A structured user intent, as handed over by the recognition layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Descriptive text of what the user wants, e.g. `"sales trend"`.
    pub descriptive_text: String,
    /// Free-form flags from the recognition layer (action kind,
    /// confidence, fallback markers, ...). Opaque to the core.
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,
    /// Explicit parameter values; these always win over schema defaults.
    #[serde(default)]
    pub parameters: ParameterMap,
    /// Preferred module execution order. Modules listed here earn a
    /// priority bonus, earlier entries more.
    #[serde(default)]
    pub module_order: Vec<String>,
}

impl Intent {
    pub fn new(descriptive_text: impl Into<String>) -> Self {
        Self {
            descriptive_text: descriptive_text.into(),
            ..Self::default()
        }
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: Value) -> Self {
        self.flags.insert(key.into(), value);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_module_order(mut self, order: Vec<String>) -> Self {
        self.module_order = order;
        self
    }
}

/// Deterministic, bounded measure of how well an intent fits a module.
///
/// Implementations must return a value in `[0, 1]` and must be pure: the
/// same inputs always score the same. The generator multiplies this into
/// the priority formula, so nondeterminism here would make ranking flap.
pub trait IntentMatcher: Send + Sync {
    fn score(&self, intent: &Intent, module: &ModuleDescriptor) -> f64;
}

/// Token-overlap matcher over the module's id, name and description.
///
/// Tokenizes the descriptive text on spaces, underscores and dashes and
/// counts tokens that occur in the module's text. No NLP, no surprises.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher;

impl IntentMatcher for KeywordMatcher {
    fn score(&self, intent: &Intent, module: &ModuleDescriptor) -> f64 {
        let text = intent.descriptive_text.to_lowercase();
        let tokens: Vec<&str> = text
            .split([' ', '_', '-'])
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return 0.0;
        }

        let haystack = format!(
            "{} {} {}",
            module.id.to_lowercase(),
            module.name.to_lowercase(),
            module.description.to_lowercase()
        );
        let matched = tokens.iter().filter(|t| haystack.contains(*t)).count();

        (matched as f64 / tokens.len() as f64).min(1.0)
    }
}
