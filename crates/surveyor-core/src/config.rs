//! Declarative registry configuration.
//!
//! Modules and data sources are declared in a TOML file and loaded once at
//! startup into an owned [`Registry`]. Duplicate ids, unknown parameter
//! types and type-mismatched defaults are rejected here, so the planning
//! path can trust its descriptors.
//!
//! ```toml
//! [[modules]]
//! id = "trend_analysis"
//! name = "Trend analysis"
//! supported_source_kinds = ["csv", "parquet"]
//! required_fields = ["sales"]
//!
//! [modules.parameters.window]
//! type = "integer"
//! default = 12
//! required = true
//!
//! [[sources]]
//! id = "sales_csv"
//! kind = "csv"
//! available_fields = ["sales", "date"]
//! connection_info = "data/sales.csv"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::registry::{
    DataSourceDescriptor, ModuleDescriptor, ParameterSpec, ParameterType, Registry,
};

/// Top-level registry config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One `[[modules]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub supported_source_kinds: BTreeSet<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub available_fields: BTreeSet<String>,
    pub connection_info: String,
    #[serde(default)]
    pub size_hint: Option<u64>,
}

/// Load and validate a registry from a TOML file.
pub fn load_registry(path: impl AsRef<Path>) -> ConfigResult<Registry> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = registry_from_toml(&raw)?;
    info!(
        path = %path.display(),
        modules = registry.module_count(),
        sources = registry.source_count(),
        "loaded registry config"
    );
    Ok(registry)
}

/// Parse and validate a registry from TOML text.
pub fn registry_from_toml(raw: &str) -> ConfigResult<Registry> {
    let config: RegistryConfig = toml::from_str(raw)?;
    build_registry(config)
}

/// Validate a parsed [`RegistryConfig`] into a [`Registry`].
pub fn build_registry(config: RegistryConfig) -> ConfigResult<Registry> {
    if config.modules.is_empty() && config.sources.is_empty() {
        return Err(ConfigError::EmptyRegistry);
    }

    let mut registry = Registry::new();
    for module in config.modules {
        for (name, spec) in &module.parameters {
            if let Some(default) = &spec.default {
                if !default_matches(spec.param_type, default) {
                    return Err(ConfigError::DefaultTypeMismatch {
                        module: module.id.clone(),
                        parameter: name.clone(),
                        expected: spec.param_type,
                    });
                }
            }
        }

        let descriptor = ModuleDescriptor {
            id: module.id.clone(),
            name: module.name,
            description: module.description,
            supported_source_kinds: module.supported_source_kinds,
            required_fields: module.required_fields,
            optional_fields: module.optional_fields,
            parameter_schema: module.parameters,
        };
        if registry.register_module(descriptor).is_some() {
            return Err(ConfigError::DuplicateModule { id: module.id });
        }
    }

    for source in config.sources {
        let descriptor = DataSourceDescriptor {
            id: source.id.clone(),
            kind: source.kind,
            available_fields: source.available_fields,
            connection_info: source.connection_info,
            size_hint: source.size_hint,
        };
        if registry.register_source(descriptor).is_some() {
            return Err(ConfigError::DuplicateSource { id: source.id });
        }
    }

    Ok(registry)
}

fn default_matches(param_type: ParameterType, value: &Value) -> bool {
    match param_type {
        ParameterType::String => value.is_string(),
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Float => value.is_number(),
        ParameterType::Boolean => value.is_boolean(),
        ParameterType::List => value.is_array(),
    }
}
