//! Capability registry: descriptors for analysis modules and data sources.
//!
//! The registry is a plain owned value populated once at startup (usually
//! from configuration, see [`crate::config`]) and passed by reference into
//! the generator, planner and engine. It holds *descriptors*, never live
//! module instances — instantiation is the engine's job, on first use.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::capability::AnalysisModule;

/// Resolved parameter assignments for one strategy or step.
///
/// A `BTreeMap` keeps iteration deterministic, which the generator relies
/// on for reproducible candidate ordering.
pub type ParameterMap = BTreeMap<String, Value>;

/// Declared type of a module parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    List,
}

/// Schema entry for a single module parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Declared value type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Default used when neither the intent nor the source yields a value.
    #[serde(default)]
    pub default: Option<Value>,
    /// Whether the module refuses to run without this parameter.
    #[serde(default)]
    pub required: bool,
}

/// Static capability declaration for one analysis module.
///
/// Immutable after registration. The descriptor says what a module can
/// consume; the module's algorithm stays behind [`AnalysisModule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module id, e.g. `"trend_analysis"`.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Free-text description; feeds intent matching and cost estimation.
    #[serde(default)]
    pub description: String,
    /// Source kinds this module can read, e.g. `"csv"`, `"parquet"`.
    pub supported_source_kinds: BTreeSet<String>,
    /// Fields the module cannot run without. Empty means "any schema".
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Fields the module can exploit when present.
    #[serde(default)]
    pub optional_fields: Vec<String>,
    /// Parameter name -> schema entry.
    #[serde(default)]
    pub parameter_schema: BTreeMap<String, ParameterSpec>,
}

/// One accessible data resource.
///
/// `connection_info` is an opaque handle owned by the external data layer;
/// this core passes it through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    /// Unique source id, e.g. `"sales_csv"`.
    pub id: String,
    /// Source kind, matched against `supported_source_kinds`.
    pub kind: String,
    /// Fields readable from this source.
    #[serde(default)]
    pub available_fields: BTreeSet<String>,
    /// Opaque handle or URI, never interpreted here.
    pub connection_info: String,
    /// Approximate row count, used only for cost estimation.
    #[serde(default)]
    pub size_hint: Option<u64>,
}

/// Snapshot of what the registry currently holds, for the enclosing
/// workflow layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub module_count: usize,
    pub source_count: usize,
    pub module_ids: Vec<String>,
    pub source_ids: Vec<String>,
}

/// Owned lookup table over module and data-source descriptors.
///
/// Populate at startup, then treat as read-only. Id-sorted iteration keeps
/// every downstream consumer deterministic.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    modules: BTreeMap<String, ModuleDescriptor>,
    sources: BTreeMap<String, DataSourceDescriptor>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module descriptor. Returns the previously registered
    /// descriptor when the id was already taken.
    pub fn register_module(&mut self, module: ModuleDescriptor) -> Option<ModuleDescriptor> {
        debug!(module_id = %module.id, "registering module");
        self.modules.insert(module.id.clone(), module)
    }

    /// Register the descriptor a live module declares for itself.
    pub fn register_declared(&mut self, module: &dyn AnalysisModule) -> Option<ModuleDescriptor> {
        self.register_module(module.declare())
    }

    /// Register a data-source descriptor. Returns the previously registered
    /// descriptor when the id was already taken.
    pub fn register_source(&mut self, source: DataSourceDescriptor) -> Option<DataSourceDescriptor> {
        debug!(source_id = %source.id, kind = %source.kind, "registering data source");
        self.sources.insert(source.id.clone(), source)
    }

    /// Look up a module descriptor by id.
    pub fn module(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(id)
    }

    /// Look up a data-source descriptor by id.
    pub fn source(&self, id: &str) -> Option<&DataSourceDescriptor> {
        self.sources.get(id)
    }

    /// All module descriptors, ascending by id.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// All data-source descriptors, ascending by id.
    pub fn sources(&self) -> impl Iterator<Item = &DataSourceDescriptor> {
        self.sources.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Status snapshot with counts and ids.
    pub fn status(&self) -> RegistryStatus {
        RegistryStatus {
            module_count: self.modules.len(),
            source_count: self.sources.len(),
            module_ids: self.modules.keys().cloned().collect(),
            source_ids: self.sources.keys().cloned().collect(),
        }
    }
}
