//! # Generator Contract
//!
//! This module defines the interface every generator implements and the
//! value types flowing across it.
//!
//! A generator is deliberately small: an applicability predicate plus a
//! generation operation. All metadata (name, version, declared capability
//! requirements and provisions, tie-break weight) lives in a separate,
//! data-only [`Descriptor`] value rather than on the generator itself, so a
//! generator *has* a descriptor instead of *being* one. The
//! [`Registry`](crate::registry::Registry) pairs each descriptor with a
//! factory and instantiates generators lazily.
//!
//! Capability tokens are opaque, comparable strings: a generator `requires`
//! the tokens it depends on and `provides` the tokens it offers, and the
//! dependency resolver matches them up without interpreting them.

use crate::config::Config;
use crate::context::GenerationContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable metadata record identifying a generator and its dependency
/// contract.
///
/// `name` is unique within a registry. `order` is an integer tie-break
/// weight: among otherwise-equal nodes, lower runs earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Registry-unique generator name.
    pub name: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Generator version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Tie-break weight; lower runs earlier among otherwise-equal nodes.
    #[serde(default = "default_order")]
    pub order: i32,
    /// Capability tokens this generator depends on.
    #[serde(default)]
    pub requires: BTreeSet<String>,
    /// Capability tokens this generator offers.
    #[serde(default)]
    pub provides: BTreeSet<String>,
    /// Coarse grouping used for listing and filtering.
    #[serde(default = "default_category")]
    pub category: String,
    /// Free-form labels used for listing and filtering.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_order() -> i32 {
    100
}

fn default_category() -> String {
    "general".to_string()
}

impl Descriptor {
    /// Create a descriptor with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: default_version(),
            order: default_order(),
            requires: BTreeSet::new(),
            provides: BTreeSet::new(),
            category: default_category(),
            tags: BTreeSet::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn requires(mut self, tokens: &[&str]) -> Self {
        self.requires = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn provides(mut self, tokens: &[&str]) -> Self {
        self.provides = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// One unit of generated output.
///
/// Artifacts are immutable once produced; ownership transfers from the
/// generator to the [`GenerationContext`] at emission time. `path` is
/// relative to the run's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Output-relative path.
    pub path: String,
    /// Text payload.
    pub content: String,
    /// Classification used by writers/formatters; opaque to the core.
    pub file_type: String,
    /// Set the executable bits when written (unix only).
    pub executable: bool,
    /// Append to an existing file instead of replacing it.
    pub append: bool,
    /// Provenance metadata (`producer`, `template`, `created_at`).
    pub metadata: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            file_type: "text".to_string(),
            executable: false,
            append: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Record provenance: which generator produced this artifact and from
    /// which template, plus a creation timestamp.
    pub fn stamp(mut self, producer: &str, template: Option<&str>) -> Self {
        self.metadata
            .insert("producer".to_string(), producer.to_string());
        if let Some(template) = template {
            self.metadata
                .insert("template".to_string(), template.to_string());
        }
        self.metadata.insert(
            "created_at".to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
        self
    }
}

/// The interface every generator implements.
///
/// Instances are shared across worker threads within an execution level, so
/// implementations must be free of cross-invocation mutable state beyond
/// their own configuration.
pub trait Generator: Send + Sync {
    /// Whether this generator has anything to do for the given config.
    ///
    /// Must be cheap and must not error; "cannot tell" reads as "not
    /// applicable".
    fn applies(&self, config: &Config) -> bool;

    /// Produce artifacts for the given config.
    ///
    /// Errors are caught at the per-generator boundary by the scheduler and
    /// recorded in the context; they do not abort sibling generators.
    fn generate(&self, config: &Config, ctx: &GenerationContext) -> Result<Vec<Artifact>>;

    /// Rough artifact count used by plan previews. Defaults to 1.
    fn estimated_artifacts(&self, _config: &Config) -> usize {
        1
    }
}

/// Constructs a generator instance on first use.
///
/// A factory may fail (e.g. a plugin-supplied generator with a broken
/// environment); the registry records the failure as a diagnostic instead of
/// propagating it.
pub type GeneratorFactory = Box<dyn Fn() -> Result<Box<dyn Generator>> + Send + Sync>;
