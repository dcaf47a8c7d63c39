//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent a generation
//! configuration, as well as the logic for parsing one from YAML. The engine
//! treats the configuration as an already-validated, mostly opaque value:
//! generators inspect it through [`Config::feature_enabled`] and friends to
//! decide applicability, but the engine core never interprets the domain
//! vocabulary itself.
//!
//! ## Key Components
//!
//! - **`Config`**: The declarative input to a generation run: a project
//!   name plus free-form feature flags, application names, and template
//!   variables. Hosts usually obtain one via [`parse`].
//!
//! - **`Settings`**: Engine tuning knobs (parallelism, worker count,
//!   fail-fast behavior, conflict policy). Every field has a serde default
//!   so a settings block can be partial or absent.
//!
//! - **`ConflictPolicy`**: The per-path strategy applied when a proposed
//!   artifact write collides with different pre-existing content.
//!
//! ## Parsing
//!
//! The `parse` function is the main entry point for parsing a YAML string
//! into a `Config`. Parse failures are reported as [`Error::Config`] with a
//! hint where one can be offered; the engine never sees a half-parsed
//! configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative configuration for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project name; used by generators for naming and by hosts for display.
    pub project: String,
    /// Free-form feature tree. Generators read this to decide applicability
    /// (e.g. `features.api.rest: true`).
    #[serde(default)]
    pub features: BTreeMap<String, serde_yaml::Value>,
    /// Application/component names the project is composed of.
    #[serde(default)]
    pub apps: Vec<String>,
    /// Template variables passed through to generators verbatim.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Config {
    /// Create a minimal configuration with just a project name.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            features: BTreeMap::new(),
            apps: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Look up a dotted feature path (e.g. `"api.rest"`) in the feature tree.
    ///
    /// Returns `true` only if the path resolves to a boolean `true` or to a
    /// non-empty mapping. Missing keys and any other value shapes read as
    /// disabled; applicability predicates must not error on absent features.
    pub fn feature_enabled(&self, path: &str) -> bool {
        let mut segments = path.split('.');
        let first = match segments.next() {
            Some(s) => s,
            None => return false,
        };
        let mut current = match self.features.get(first) {
            Some(v) => v,
            None => return false,
        };
        for segment in segments {
            current = match current.as_mapping().and_then(|m| m.get(segment)) {
                Some(v) => v,
                None => return false,
            };
        }
        match current {
            serde_yaml::Value::Bool(b) => *b,
            serde_yaml::Value::Mapping(m) => !m.is_empty(),
            _ => false,
        }
    }

    /// Whether the project declares the named app.
    pub fn has_app(&self, name: &str) -> bool {
        self.apps.iter().any(|a| a == name)
    }
}

/// Strategy for resolving a write that collides with different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the existing content and record a conflict (the default).
    #[default]
    Skip,
    /// Overwrite the existing content.
    Overwrite,
    /// Back up the existing content, then overwrite.
    Backup,
    /// Concatenate existing and new content under a generated-section
    /// marker. Lossy and best-effort, not a semantic merge.
    Merge,
    /// Defer to an external prompt collaborator; treated as `Skip` when no
    /// decision is supplied.
    Interactive,
}

/// Engine tuning knobs.
///
/// All fields default so hosts can deserialize a partial settings block or
/// just take `Settings::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Run generators within a level concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Maximum concurrent generator invocations within a level.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Keep scheduling later levels after a generator has failed.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    /// Conflict policy applied when a write collides without `force`.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Create a timestamped backup before any overwrite.
    #[serde(default = "default_backup")]
    pub backup: bool,
}

fn default_parallel() -> bool {
    true
}

fn default_max_workers() -> usize {
    4
}

fn default_continue_on_error() -> bool {
    true
}

fn default_backup() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            max_workers: default_max_workers(),
            continue_on_error: default_continue_on_error(),
            conflict_policy: ConflictPolicy::default(),
            backup: default_backup(),
        }
    }
}

/// Parse a YAML configuration string into a validated [`Config`].
pub fn parse(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml).map_err(|e| Error::Config {
        message: format!("invalid configuration: {}", e),
        hint: Some("the configuration must be a mapping with a 'project' key".to_string()),
    })?;

    if config.project.trim().is_empty() {
        return Err(Error::Config {
            message: "project name must not be empty".to_string(),
            hint: None,
        });
    }

    Ok(config)
}
