//! # Generation Engine
//!
//! The orchestration core tying everything together: selection, dependency
//! resolution, wavefront scheduling, artifact commitment, and result
//! aggregation.
//!
//! ## Execution Flow
//!
//! 1.  **Selection**: the registry filters applicable generators, optionally
//!     narrowed by caller-supplied name patterns.
//! 2.  **Planning**: the resolver produces a deterministic ordering and a
//!     level partition ([`crate::resolver`]).
//! 3.  **Scheduling**: levels run strictly sequentially; generators within a
//!     level run concurrently on a bounded worker pool. Each generator's
//!     artifacts are appended to the shared [`GenerationContext`] and
//!     committed through the [`ArtifactWriter`] as the generator completes.
//! 4.  **Aggregation**: the context's accumulated artifacts, errors,
//!     warnings and counters become the [`GenerationReport`].
//!
//! ## Failure Semantics
//!
//! A generator failure is caught at the per-generator boundary, formatted as
//! `"<name> failed: <message>"`, and recorded; it never aborts sibling
//! generators in the same level. Before each new level the scheduler checks
//! `continue_on_error`; under fail-fast, already-running work finishes but
//! nothing new starts. Only configuration and cycle errors escape
//! [`Engine::generate`] as `Err`; the caller decides success purely from
//! "is the error list empty".
//!
//! The engine is an explicit context object: hosts construct one per
//! registry/settings combination and may run it repeatedly. There are no
//! process-global singletons.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::{Config, Settings};
use crate::context::{
    GenerationContext, STAT_ARTIFACTS_WRITTEN, STAT_EXECUTION_TIME_MS, STAT_GENERATORS_EXECUTED,
};
use crate::error::{Error, Result};
use crate::generator::{Artifact, Descriptor};
use crate::plugin::PluginManager;
use crate::registry::Registry;
use crate::resolver::{self, ExecutionPlan};
use crate::writer::{ArtifactWriter, ConflictRecord, Disposition, WriteSummary};

/// Per-run knobs passed to [`Engine::generate`].
#[derive(Default)]
pub struct GenerateOptions {
    /// Overwrite colliding files regardless of conflict policy.
    pub force: bool,
    /// Decide everything, touch nothing on disk.
    pub dry_run: bool,
    /// Optional name patterns (glob syntax) narrowing the selection.
    pub selected: Option<Vec<String>>,
    /// Restore backups and delete newly created files when the run ends
    /// with errors.
    pub rollback_on_error: bool,
}

/// Snapshot handed to progress observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub message: String,
    /// Generators completed so far.
    pub current: usize,
    /// Generators in the plan.
    pub total: usize,
}

/// Observer invoked before each generator starts and when a level completes.
///
/// Observer failures are logged, never propagated.
pub type ProgressObserver = Box<dyn Fn(&Progress) -> Result<()> + Send + Sync>;

/// Hook invoked around a run with access to the shared context.
pub type RunHook = Box<dyn Fn(&GenerationContext) -> Result<()> + Send + Sync>;

/// Final result of a generation run.
#[derive(Debug)]
pub struct GenerationReport {
    /// True iff the error list is empty.
    pub success: bool,
    /// Artifacts emitted by generators, in completion order.
    pub artifacts: Vec<Artifact>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Conflicts where existing content was kept.
    pub conflicts: Vec<ConflictRecord>,
    /// Counters: `generators_executed`, `artifacts_written`,
    /// `execution_time_ms`, plus anything generators recorded.
    pub stats: BTreeMap<String, u64>,
    /// What the writer did to the output tree.
    pub write_summary: WriteSummary,
}

/// Side-effect-free preview of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Canonical flattened execution order.
    pub ordered: Vec<String>,
    /// Level partition; generators within a level may run concurrently.
    pub levels: Vec<Vec<String>>,
    /// Sum of the selected generators' own artifact estimates.
    pub estimated_artifacts: usize,
    pub warnings: Vec<String>,
}

struct Selection {
    descriptors: Vec<Descriptor>,
    warnings: Vec<String>,
}

/// The orchestration engine. One per registry/settings combination.
pub struct Engine {
    registry: Registry,
    plugins: PluginManager,
    settings: Settings,
    observers: Vec<ProgressObserver>,
    pre_run_hooks: Vec<RunHook>,
    post_run_hooks: Vec<RunHook>,
}

impl Engine {
    pub fn new(registry: Registry, settings: Settings) -> Self {
        Self::with_plugins(registry, PluginManager::new(), settings)
    }

    /// Build an engine whose plugin manager has already loaded its plugins
    /// (and contributed their generators to `registry`).
    pub fn with_plugins(registry: Registry, plugins: PluginManager, settings: Settings) -> Self {
        Self {
            registry,
            plugins,
            settings,
            observers: Vec::new(),
            pre_run_hooks: Vec::new(),
            post_run_hooks: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn add_progress_observer(&mut self, observer: ProgressObserver) {
        self.observers.push(observer);
    }

    pub fn add_pre_run_hook(&mut self, hook: RunHook) {
        self.pre_run_hooks.push(hook);
    }

    pub fn add_post_run_hook(&mut self, hook: RunHook) {
        self.post_run_hooks.push(hook);
    }

    /// Preview the run for a configuration without side effects.
    pub fn plan(&self, config: &Config, selected: Option<&[String]>) -> Result<Plan> {
        let selection = self.select(config, selected)?;
        let resolution = resolver::resolve(&selection.descriptors)?;

        let estimated_artifacts = resolution
            .plan
            .ordered
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .map(|g| g.estimated_artifacts(config))
                    .unwrap_or(0)
            })
            .sum();

        let mut warnings = selection.warnings;
        warnings.extend(resolution.warnings);

        Ok(Plan {
            ordered: resolution.plan.ordered,
            levels: resolution.plan.levels,
            estimated_artifacts,
            warnings,
        })
    }

    /// Run generation for a configuration into `output_dir`.
    ///
    /// Returns `Err` only for configuration and cycle errors, both of which
    /// leave the output tree untouched. Every other failure is accumulated
    /// into the report.
    pub fn generate(
        &self,
        config: &Config,
        output_dir: &Path,
        options: &GenerateOptions,
    ) -> Result<GenerationReport> {
        let start = Instant::now();
        let ctx = GenerationContext::new();
        run_hooks(&self.pre_run_hooks, &ctx, "pre-run");

        // Planning before any disk access: the output tree stays untouched
        // unless the plan is valid
        let selection = self.select(config, options.selected.as_deref())?;
        let resolution = resolver::resolve(&selection.descriptors)?;
        for warning in selection.warnings {
            ctx.add_warning(warning);
        }
        for warning in resolution.warnings {
            ctx.add_warning(warning);
        }

        let writer = ArtifactWriter::new(
            output_dir,
            options.force,
            options.dry_run,
            self.settings.conflict_policy,
            self.settings.backup,
        )
        .map_err(|e| Error::Config {
            message: format!("output directory is unusable: {}", e),
            hint: None,
        })?;

        info!(
            "executing {} generators across {} levels",
            resolution.plan.ordered.len(),
            resolution.plan.levels.len()
        );
        self.execute_levels(&resolution.plan, config, &ctx, &writer);

        for record in writer.conflicts() {
            ctx.add_warning(format!(
                "conflict: kept existing content at '{}'",
                record.path
            ));
        }

        run_hooks(&self.post_run_hooks, &ctx, "post-run");
        run_hooks(self.plugins.post_run_hooks(), &ctx, "plugin post-run");

        ctx.set_stat(
            STAT_EXECUTION_TIME_MS,
            start.elapsed().as_millis() as u64,
        );

        let success = !ctx.has_errors();
        if success {
            writer.cleanup_backups();
        } else if options.rollback_on_error {
            warn!("run failed; rolling back written artifacts");
            writer.rollback();
        }

        let conflicts = writer.conflicts();
        let write_summary = writer.summary();
        let parts = ctx.into_parts();
        Ok(GenerationReport {
            success,
            artifacts: parts.artifacts,
            errors: parts.errors,
            warnings: parts.warnings,
            conflicts,
            stats: parts.stats,
            write_summary,
        })
    }

    /// Filter applicable generators, optionally narrowed by glob patterns.
    fn select(&self, config: &Config, selected: Option<&[String]>) -> Result<Selection> {
        let applicable = self.registry.applicable(config);
        let patterns = match selected {
            None => {
                return Ok(Selection {
                    descriptors: applicable,
                    warnings: Vec::new(),
                })
            }
            Some(patterns) => patterns,
        };

        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = glob::Pattern::new(raw).map_err(|e| Error::Config {
                message: format!("invalid generator selection pattern '{}': {}", raw, e),
                hint: None,
            })?;
            compiled.push((raw.as_str(), pattern));
        }

        let descriptors: Vec<Descriptor> = applicable
            .into_iter()
            .filter(|d| compiled.iter().any(|(_, p)| p.matches(&d.name)))
            .collect();

        let mut warnings = Vec::new();
        for (raw, pattern) in &compiled {
            let registered = self
                .registry
                .descriptors()
                .iter()
                .any(|d| pattern.matches(&d.name));
            if !registered {
                return Err(Error::Config {
                    message: format!("selected generator '{}' is not registered", raw),
                    hint: Some("list available generators via the registry".to_string()),
                });
            }
            if !descriptors.iter().any(|d| pattern.matches(&d.name)) {
                warnings.push(format!(
                    "selected generator '{}' is not applicable to this configuration",
                    raw
                ));
            }
        }

        Ok(Selection {
            descriptors,
            warnings,
        })
    }

    /// Run the plan: levels strictly in sequence, bounded parallelism within.
    fn execute_levels(
        &self,
        plan: &ExecutionPlan,
        config: &Config,
        ctx: &GenerationContext,
        writer: &ArtifactWriter,
    ) {
        let total = plan.ordered.len();
        let completed = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);

        // Captured by worker closures; the plugin manager stays out of the
        // parallel region.
        let registry = &self.registry;
        let observers = &self.observers[..];
        let fail_fast = !self.settings.continue_on_error;

        for (index, level) in plan.levels.iter().enumerate() {
            if fail_fast && ctx.has_errors() {
                warn!(
                    "stopping before level {}: previous generator errors",
                    index + 1
                );
                break;
            }

            let run_one = |name: &String| {
                // Cooperative cancellation: queued work that has not
                // started yet is dropped once a sibling has failed
                if abort.load(Ordering::SeqCst) {
                    return;
                }
                notify(
                    observers,
                    &format!("running {}", name),
                    completed.load(Ordering::SeqCst),
                    total,
                );
                run_generator(registry, name, config, ctx, writer);
                completed.fetch_add(1, Ordering::SeqCst);
                if fail_fast && ctx.has_errors() {
                    abort.store(true, Ordering::SeqCst);
                }
            };

            if self.settings.parallel && level.len() > 1 {
                let workers = self.settings.max_workers.max(1).min(level.len());
                match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                    Ok(pool) => pool.install(|| level.par_iter().for_each(run_one)),
                    Err(e) => {
                        warn!("worker pool unavailable ({}); running level sequentially", e);
                        level.iter().for_each(run_one);
                    }
                }
            } else {
                level.iter().for_each(run_one);
            }

            notify(
                observers,
                &format!("level {} of {} complete", index + 1, plan.levels.len()),
                completed.load(Ordering::SeqCst),
                total,
            );
        }
    }
}

/// Execute one generator and commit its artifacts.
///
/// Every failure path lands in the context; nothing propagates.
fn run_generator(
    registry: &Registry,
    name: &str,
    config: &Config,
    ctx: &GenerationContext,
    writer: &ArtifactWriter,
) {
    let instance = match registry.get(name) {
        Some(instance) => instance,
        None => {
            ctx.add_error(format!("{} failed: generator instance unavailable", name));
            return;
        }
    };

    // Applicability was established at selection time; re-check defensively
    if !instance.applies(config) {
        ctx.add_warning(format!(
            "{} no longer applicable at execution time; skipping",
            name
        ));
        return;
    }

    match instance.generate(config, ctx) {
        Ok(artifacts) => {
            debug!("generator '{}' emitted {} artifacts", name, artifacts.len());
            for artifact in artifacts {
                match writer.write(&artifact) {
                    Ok(disposition) => {
                        if matches!(
                            disposition,
                            Disposition::Written
                                | Disposition::Overwritten
                                | Disposition::Merged
                                | Disposition::Appended
                                | Disposition::WouldWrite
                        ) {
                            ctx.increment_stat(STAT_ARTIFACTS_WRITTEN, 1);
                        }
                        ctx.add_artifact(artifact);
                    }
                    Err(e) => {
                        ctx.add_error(format!("{} failed: {}", name, e));
                    }
                }
            }
            ctx.increment_stat(STAT_GENERATORS_EXECUTED, 1);
        }
        Err(e) => {
            ctx.add_error(format!("{} failed: {}", name, e));
        }
    }
}

fn notify(observers: &[ProgressObserver], message: &str, current: usize, total: usize) {
    let progress = Progress {
        message: message.to_string(),
        current,
        total,
    };
    for observer in observers {
        if let Err(e) = observer(&progress) {
            warn!("progress observer failed: {}", e);
        }
    }
}

/// Invoke hooks in order, each isolated: one failing hook never blocks the
/// others.
fn run_hooks(hooks: &[RunHook], ctx: &GenerationContext, stage: &str) {
    for hook in hooks {
        if let Err(e) = hook(ctx) {
            warn!("{} hook failed: {}", stage, e);
        }
    }
}
