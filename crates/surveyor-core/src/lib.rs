//! Surveyor Core Library
//!
//! Selects, ranks and executes compatible analysis-module invocations
//! against registered data sources. The flow is strictly one-directional:
//! registry → compatibility scorer → strategy generator → planner →
//! execution engine → aggregator → follow-up generator, which feeds new
//! intents back into the generator for the next cycle.

pub mod aggregate;
pub mod capability;
pub mod compat;
pub mod config;
pub mod engine;
pub mod error;
pub mod followup;
pub mod intent;
pub mod planner;
pub mod registry;
pub mod strategy;
pub mod telemetry;

pub use aggregate::{AggregatedOutcome, ResultAggregator};

pub use capability::{AnalysisModule, ExecutionContext, ModuleFactory, ModuleOutput};

pub use compat::CompatibilityResult;

pub use config::{build_registry, load_registry, registry_from_toml, RegistryConfig};

pub use engine::{
    CancellationHandle, EngineConfig, ExecutionEngine, StepError, StepErrorKind, StepResult,
};

pub use error::{ConfigError, ConfigResult, PlanError, PlanResult};

pub use followup::{followups, MISSING_VALUE_MARKER, VISUALIZATION_KEY};

pub use intent::{Intent, IntentMatcher, KeywordMatcher};

pub use planner::{plan, ExecutionPlan, ExecutionStep};

pub use registry::{
    DataSourceDescriptor, ModuleDescriptor, ParameterMap, ParameterSpec, ParameterType, Registry,
    RegistryStatus,
};

pub use strategy::{Strategy, StrategyGenerator};

pub use telemetry::{init_tracing, TelemetryOptions};

/// Surveyor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
