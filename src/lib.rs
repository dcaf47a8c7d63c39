//! # Codeforge
//!
//! A pluggable code-generation orchestration library. Hosts register
//! generators (each declaring what it requires and what it provides), hand
//! the engine a project configuration, and receive a generated file tree
//! plus a full report of what happened.
//!
//! ## Quick Example
//!
//! ```
//! use codeforge::config::{Config, Settings};
//! use codeforge::engine::{Engine, GenerateOptions};
//! use codeforge::context::GenerationContext;
//! use codeforge::generator::{Artifact, Descriptor, Generator};
//! use codeforge::registry::Registry;
//!
//! struct Readme;
//!
//! impl Generator for Readme {
//!     fn applies(&self, _config: &Config) -> bool {
//!         true
//!     }
//!
//!     fn generate(
//!         &self,
//!         config: &Config,
//!         _ctx: &GenerationContext,
//!     ) -> codeforge::error::Result<Vec<Artifact>> {
//!         Ok(vec![Artifact::new(
//!             "README.md",
//!             format!("# {}\n", config.project),
//!         )])
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register(Descriptor::new("readme"), Box::new(|| Ok(Box::new(Readme))));
//!
//! let engine = Engine::new(registry, Settings::default());
//! let dir = tempfile::tempdir().unwrap();
//! let report = engine
//!     .generate(&Config::new("demo"), dir.path(), &GenerateOptions::default())
//!     .unwrap();
//! assert!(report.success);
//! assert!(dir.path().join("README.md").exists());
//! ```
//!
//! ## Core Concepts
//!
//! The library is built around a few key concepts:
//!
//! - **Configuration (`config`)**: The declarative project description that
//!   drives a run, plus engine-level settings such as parallelism and the
//!   conflict policy.
//! - **Generators (`generator`, `registry`)**: Pluggable units of work. A
//!   data-only [`generator::Descriptor`] carries identity, ordering, and
//!   capability tokens; the [`registry::Registry`] holds descriptors with
//!   factories and caches instances.
//! - **Dependency Resolution (`resolver`)**: Matches `requires` tokens to
//!   `provides` tokens, topologically sorts the result deterministically,
//!   and partitions it into parallel-safe levels. Cycles are a hard error.
//! - **Shared Context (`context`)**: A thread-safe accumulator for
//!   artifacts, errors, warnings, and counters that generators running in
//!   parallel all write into.
//! - **Artifact Writing (`writer`)**: Commits generated content to disk
//!   with conflict detection, backups, bounded diffs, dry-run support, and
//!   rollback.
//! - **Plugins (`plugin`)**: Externally authored bundles of generators and
//!   post-run hooks, loaded through an explicit registration contract.
//!
//! ## Execution Flow
//!
//! The main entry point is [`engine::Engine::generate`], which executes the
//! following high-level steps:
//!
//! 1.  **Selection**: filter registered generators by applicability and the
//!     caller's optional name patterns.
//! 2.  **Resolution**: build the deterministic execution order and the
//!     level partition.
//! 3.  **Execution**: run levels strictly in sequence; within a level, run
//!     generators concurrently on a bounded worker pool. Each generator's
//!     artifacts are committed as it completes.
//! 4.  **Reporting**: aggregate artifacts, errors, warnings, conflicts, and
//!     counters into a [`engine::GenerationReport`].
//!
//! Generator failures are contained at the per-generator boundary; only
//! configuration and dependency-cycle errors abort a run.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod generator;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod writer;

pub use config::{Config, ConflictPolicy, Settings};
pub use engine::{Engine, GenerateOptions, GenerationReport, Plan};
pub use error::{Error, Result};
pub use generator::{Artifact, Descriptor, Generator};
pub use registry::Registry;
