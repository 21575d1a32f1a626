//! The uniform capability interface every analysis module implements.
//!
//! The engine depends on nothing but this contract: a module declares its
//! capabilities as a [`ModuleDescriptor`] and executes with resolved
//! parameters against an opaque data-source context. Inject real analysis
//! implementations in production and deterministic stubs in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{DataSourceDescriptor, ModuleDescriptor, ParameterMap};

/// What a module hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Opaque result value; the core never interprets it beyond the
    /// follow-up rules' marker inspection.
    pub payload: Value,
    /// Human-readable findings, merged across steps by the aggregator.
    #[serde(default)]
    pub insights: Vec<String>,
}

impl ModuleOutput {
    /// Output with a payload and no insights.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            insights: Vec::new(),
        }
    }

    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insights.push(insight.into());
        self
    }
}

/// Per-invocation context handed to a module.
///
/// Carries the data-source descriptor, including its opaque
/// `connection_info` handle. The module talks to the data layer through
/// that handle; this core never does.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub source: DataSourceDescriptor,
}

/// An analysis unit consumed through a uniform execute interface.
///
/// Implementations must be cheap to share (`Arc<dyn AnalysisModule>`) and
/// safe to invoke concurrently — the engine may run several steps of the
/// same module in parallel against different sources.
#[async_trait]
pub trait AnalysisModule: Send + Sync {
    /// The capability declaration this module registers under.
    fn declare(&self) -> ModuleDescriptor;

    /// Run the analysis with resolved parameters against one data source.
    ///
    /// Errors returned here are captured as step-result data by the engine,
    /// never propagated to its caller.
    async fn execute(
        &self,
        parameters: &ParameterMap,
        context: &ExecutionContext,
    ) -> anyhow::Result<ModuleOutput>;
}

/// Creates module instances on first use.
///
/// The engine caches what this returns by module id; instantiation runs at
/// most once per id per cache lifetime.
pub trait ModuleFactory: Send + Sync {
    fn instantiate(&self, descriptor: &ModuleDescriptor) -> anyhow::Result<Arc<dyn AnalysisModule>>;
}
