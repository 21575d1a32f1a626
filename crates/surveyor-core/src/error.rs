//! Error types for planning and configuration.
//!
//! Only structural planning problems and bad configuration surface as hard
//! errors. Everything that goes wrong while *executing* a plan is captured
//! as data on the step result instead (see [`crate::engine::StepError`]),
//! so a single bad module or source can never abort a whole plan.

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ParameterType;

/// Errors produced while converting strategies into an execution plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The strategies' dependency declarations form a cycle.
    #[error("dependency cycle detected among strategies: {keys:?}")]
    CyclicPlan { keys: Vec<String> },

    /// A strategy depends on a key absent from the planned set.
    #[error("strategy '{strategy}' depends on '{dependency}', which is not in the planned set")]
    UnresolvedDependency {
        strategy: String,
        dependency: String,
    },
}

/// Convenience result alias for planning calls.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Errors produced while loading the registry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read registry config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML (or declares an unknown
    /// parameter type).
    #[error("failed to parse registry config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two modules share an id.
    #[error("duplicate module id '{id}' in registry config")]
    DuplicateModule { id: String },

    /// Two data sources share an id.
    #[error("duplicate data source id '{id}' in registry config")]
    DuplicateSource { id: String },

    /// A parameter default does not match its declared type.
    #[error(
        "default for parameter '{parameter}' of module '{module}' does not match declared type {expected:?}"
    )]
    DefaultTypeMismatch {
        module: String,
        parameter: String,
        expected: ParameterType,
    },

    /// The config declares neither modules nor data sources.
    #[error("registry config declares no modules and no data sources")]
    EmptyRegistry,
}

/// Convenience result alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
