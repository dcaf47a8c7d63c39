//! # Generation Context
//!
//! The single shared, mutable, concurrency-safe object accumulating
//! artifacts, errors, warnings and counters across all generator invocations
//! of one run.
//!
//! This is the only concurrency-sensitive shared state in the engine, so
//! correctness hinges on a narrow, disciplined interface: components mutate
//! the collections exclusively through the synchronized mutators below, and
//! the lock is held only around each discrete mutation, never across a
//! generator call. A context is created once per run and discarded at run
//! end; the final result is read only after all levels have completed.
//!
//! Artifact and error/warning order reflects completion order within a
//! level, which is non-deterministic under parallel execution. Consumers
//! must not depend on intra-level ordering.

use crate::generator::Artifact;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Stat key for the number of generators that completed.
pub const STAT_GENERATORS_EXECUTED: &str = "generators_executed";
/// Stat key for the number of artifacts committed to the output tree.
pub const STAT_ARTIFACTS_WRITTEN: &str = "artifacts_written";
/// Stat key for total run duration in milliseconds.
pub const STAT_EXECUTION_TIME_MS: &str = "execution_time_ms";

#[derive(Debug, Default)]
struct ContextInner {
    artifacts: Vec<Artifact>,
    errors: Vec<String>,
    warnings: Vec<String>,
    stats: BTreeMap<String, u64>,
}

/// Concurrency-guarded aggregator for one generation run.
#[derive(Debug, Default)]
pub struct GenerationContext {
    inner: Mutex<ContextInner>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds structurally valid collections; keep
    // aggregating rather than dropping diagnostics on the floor.
    fn locked(&self) -> std::sync::MutexGuard<'_, ContextInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an artifact emitted by a generator. Ownership transfers here.
    pub fn add_artifact(&self, artifact: Artifact) {
        self.locked().artifacts.push(artifact);
    }

    /// Record a run-level error.
    pub fn add_error(&self, error: impl Into<String>) {
        self.locked().errors.push(error.into());
    }

    /// Record a run-level warning.
    pub fn add_warning(&self, warning: impl Into<String>) {
        self.locked().warnings.push(warning.into());
    }

    /// Increment a named counter, creating it at zero if absent.
    pub fn increment_stat(&self, name: &str, by: u64) {
        *self.locked().stats.entry(name.to_string()).or_insert(0) += by;
    }

    /// Overwrite a named counter.
    pub fn set_stat(&self, name: &str, value: u64) {
        self.locked().stats.insert(name.to_string(), value);
    }

    /// Whether any error has been recorded so far.
    ///
    /// The scheduler consults this at level boundaries for fail-fast
    /// decisions.
    pub fn has_errors(&self) -> bool {
        !self.locked().errors.is_empty()
    }

    pub fn artifact_count(&self) -> usize {
        self.locked().artifacts.len()
    }

    pub fn stat(&self, name: &str) -> u64 {
        self.locked().stats.get(name).copied().unwrap_or(0)
    }

    /// Consume the context after the run, yielding the accumulated
    /// collections.
    pub fn into_parts(self) -> ContextParts {
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        ContextParts {
            artifacts: inner.artifacts,
            errors: inner.errors,
            warnings: inner.warnings,
            stats: inner.stats,
        }
    }
}

/// The accumulated results of a run, extracted once execution has finished.
#[derive(Debug, Default)]
pub struct ContextParts {
    pub artifacts: Vec<Artifact>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: BTreeMap<String, u64>,
}
