//! # Generator Registry
//!
//! This module holds the descriptor/factory pairs for every known generator,
//! instantiates generators lazily (one cached instance per name), and
//! answers the selection questions the engine asks: which generators apply
//! to a configuration, whether a selection's requirements are satisfiable,
//! and who depends on whom.
//!
//! ## Registration Policy
//!
//! Names are registry-unique. Re-registering a name with an *identical*
//! descriptor is a no-op with a warning. Re-registering with a *different*
//! descriptor logs a conflict warning and the later registration wins, a
//! fixed resolution policy that lets a host override built-ins.
//!
//! ## Instance Cache
//!
//! `get` constructs an instance from the factory on first access and caches
//! it for the registry's lifetime (singleton-per-registry). A factory
//! failure is not thrown up: `get` returns `None`, the failure is logged and
//! recorded as a diagnostic, and selection treats the generator as
//! unavailable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::config::Config;
use crate::generator::{Descriptor, Generator, GeneratorFactory};

struct Entry {
    descriptor: Descriptor,
    factory: GeneratorFactory,
}

#[derive(Default)]
struct Runtime {
    instances: HashMap<String, Arc<dyn Generator>>,
    diagnostics: Vec<String>,
    cache_hits: u64,
    cache_misses: u64,
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub registered: usize,
    pub loaded: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Holds generator descriptors and factories, and caches instances.
///
/// Hosts construct a registry explicitly and pass it to the engine; there is
/// no ambient global.
#[derive(Default)]
pub struct Registry {
    /// Registration order; drives provider-index determinism downstream.
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    runtime: Mutex<Runtime>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor/factory pair.
    ///
    /// Duplicate name with an identical descriptor: warning, no-op.
    /// Duplicate name with a different descriptor: conflict warning, the
    /// later registration wins.
    pub fn register(&mut self, descriptor: Descriptor, factory: GeneratorFactory) {
        let name = descriptor.name.clone();
        if let Some(existing) = self.entries.get(&name) {
            if existing.descriptor == descriptor {
                warn!("generator '{}' registered twice with identical descriptor; ignoring", name);
                return;
            }
            warn!(
                "generator name conflict for '{}'; later registration wins",
                name
            );
            // Drop any cached instance built from the replaced factory
            let mut runtime = self.locked_runtime();
            runtime.instances.remove(&name);
        } else {
            self.order.push(name.clone());
        }
        debug!("registered generator '{}'", name);
        self.entries.insert(name, Entry { descriptor, factory });
    }

    fn locked_runtime(&self) -> std::sync::MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> Vec<&Descriptor> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|e| &e.descriptor)
            .collect()
    }

    /// All descriptors sorted by `(category, order, name)` for listings.
    pub fn list_descriptors(&self) -> Vec<&Descriptor> {
        let mut all = self.descriptors();
        all.sort_by(|a, b| {
            (a.category.as_str(), a.order, a.name.as_str())
                .cmp(&(b.category.as_str(), b.order, b.name.as_str()))
        });
        all
    }

    /// Get the cached instance for `name`, constructing it on first access.
    ///
    /// Returns `None` when the name is unknown or the factory fails; factory
    /// failures are logged and recorded as diagnostics, never propagated.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Generator>> {
        let entry = self.entries.get(name)?;

        {
            let mut runtime = self.locked_runtime();
            if let Some(instance) = runtime.instances.get(name).map(Arc::clone) {
                runtime.cache_hits += 1;
                return Some(instance);
            }
            runtime.cache_misses += 1;
        }

        // Construct outside the lock; factories may do real work
        match (entry.factory)() {
            Ok(instance) => {
                let instance: Arc<dyn Generator> = Arc::from(instance);
                let mut runtime = self.locked_runtime();
                runtime
                    .instances
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&instance));
                Some(instance)
            }
            Err(e) => {
                let diagnostic = format!("failed to construct generator '{}': {}", name, e);
                warn!("{}", diagnostic);
                self.locked_runtime().diagnostics.push(diagnostic);
                None
            }
        }
    }

    /// Descriptors of every registered generator whose applicability
    /// predicate accepts the configuration.
    ///
    /// A generator whose factory fails is treated as not applicable; the
    /// failure is already recorded as a diagnostic by [`Registry::get`].
    pub fn applicable(&self, config: &Config) -> Vec<Descriptor> {
        let mut applicable = Vec::new();
        for name in &self.order {
            if let Some(instance) = self.get(name) {
                if instance.applies(config) {
                    applicable.push(self.entries[name].descriptor.clone());
                }
            }
        }
        applicable
    }

    /// Check that every requirement of every given descriptor is provided by
    /// *some* registered generator.
    ///
    /// Unmet requirements are reported as warnings, not hard failures: a
    /// later, narrower selection step may still be valid, and the resolver
    /// re-checks against the actual selection.
    pub fn validate_requirements(&self, descriptors: &[Descriptor]) -> Vec<String> {
        let mut diagnostics = Vec::new();
        for descriptor in descriptors {
            for token in &descriptor.requires {
                let satisfied = self
                    .entries
                    .values()
                    .any(|e| e.descriptor.provides.contains(token));
                if !satisfied {
                    diagnostics.push(format!(
                        "generator '{}' requires '{}' but no registered generator provides it",
                        descriptor.name, token
                    ));
                }
            }
        }
        diagnostics
    }

    /// Names of generators whose `requires` intersects the target's
    /// `provides`.
    pub fn reverse_dependents(&self, name: &str) -> Vec<String> {
        let target = match self.entries.get(name) {
            Some(entry) => &entry.descriptor,
            None => return Vec::new(),
        };
        self.order
            .iter()
            .filter(|other| other.as_str() != name)
            .filter(|other| {
                self.entries[*other]
                    .descriptor
                    .requires
                    .iter()
                    .any(|token| target.provides.contains(token))
            })
            .cloned()
            .collect()
    }

    /// Names of generators in the given category, registration order.
    pub fn by_category(&self, category: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.entries[*name].descriptor.category == category)
            .cloned()
            .collect()
    }

    /// Names of generators carrying the given tag, registration order.
    pub fn by_tag(&self, tag: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.entries[*name].descriptor.tags.contains(tag))
            .cloned()
            .collect()
    }

    /// Diagnostics accumulated from failed factory constructions.
    pub fn diagnostics(&self) -> Vec<String> {
        self.locked_runtime().diagnostics.clone()
    }

    /// Drop all cached instances (descriptors and factories stay).
    pub fn clear_instances(&self) {
        self.locked_runtime().instances.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        let runtime = self.locked_runtime();
        RegistryStats {
            registered: self.entries.len(),
            loaded: runtime.instances.len(),
            cache_hits: runtime.cache_hits,
            cache_misses: runtime.cache_misses,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GenerationContext;
    use crate::error::{Error, Result};
    use crate::generator::Artifact;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGenerator {
        applicable: bool,
    }

    impl Generator for FixedGenerator {
        fn applies(&self, _config: &Config) -> bool {
            self.applicable
        }

        fn generate(&self, _config: &Config, _ctx: &GenerationContext) -> Result<Vec<Artifact>> {
            Ok(vec![Artifact::new("out.txt", "content")])
        }
    }

    fn fixed_factory(applicable: bool) -> GeneratorFactory {
        Box::new(move || Ok(Box::new(FixedGenerator { applicable })))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        registry.register(Descriptor::new("model"), fixed_factory(true));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("model").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_get_caches_instance() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructions);
        let factory: GeneratorFactory = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedGenerator { applicable: true }))
        });

        let mut registry = Registry::new();
        registry.register(Descriptor::new("model"), factory);
        registry.get("model").unwrap();
        registry.get("model").unwrap();
        registry.get("model").unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        let stats = registry.stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.loaded, 1);
    }

    #[test]
    fn test_clear_instances_reconstructs() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructions);
        let factory: GeneratorFactory = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedGenerator { applicable: true }))
        });

        let mut registry = Registry::new();
        registry.register(Descriptor::new("model"), factory);
        registry.get("model").unwrap();
        registry.clear_instances();
        registry.get("model").unwrap();
        assert_eq!(constructions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_identical_descriptor_is_noop() {
        let mut registry = Registry::new();
        registry.register(Descriptor::new("model"), fixed_factory(true));
        registry.register(Descriptor::new("model"), fixed_factory(false));
        assert_eq!(registry.len(), 1);
        // Original factory retained: the instance still reports applicable
        let config = Config::new("demo");
        let instance = registry.get("model").unwrap();
        assert!(instance.applies(&config));
    }

    #[test]
    fn test_duplicate_different_descriptor_later_wins() {
        let mut registry = Registry::new();
        registry.register(Descriptor::new("model"), fixed_factory(true));
        registry.register(
            Descriptor::new("model").description("override"),
            fixed_factory(false),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("model").unwrap().description, "override");
        let config = Config::new("demo");
        let instance = registry.get("model").unwrap();
        assert!(!instance.applies(&config));
    }

    #[test]
    fn test_factory_failure_returns_none_and_diagnostic() {
        let mut registry = Registry::new();
        let factory: GeneratorFactory = Box::new(|| {
            Err(Error::Generator {
                generator: "broken".to_string(),
                message: "no environment".to_string(),
            })
        });
        registry.register(Descriptor::new("broken"), factory);

        assert!(registry.get("broken").is_none());
        let diagnostics = registry.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("'broken'"));
    }

    #[test]
    fn test_applicable_filters_by_predicate() {
        let mut registry = Registry::new();
        registry.register(Descriptor::new("yes"), fixed_factory(true));
        registry.register(Descriptor::new("no"), fixed_factory(false));

        let config = Config::new("demo");
        let applicable = registry.applicable(&config);
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].name, "yes");
    }

    #[test]
    fn test_applicable_preserves_registration_order() {
        let mut registry = Registry::new();
        registry.register(Descriptor::new("zebra"), fixed_factory(true));
        registry.register(Descriptor::new("ant"), fixed_factory(true));

        let config = Config::new("demo");
        let names: Vec<_> = registry
            .applicable(&config)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["zebra", "ant"]);
    }

    #[test]
    fn test_validate_requirements() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::new("base").provides(&["proj"]),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("api").requires(&["proj", "auth"]),
            fixed_factory(true),
        );

        let descriptors: Vec<Descriptor> =
            registry.descriptors().into_iter().cloned().collect();
        let diagnostics = registry.validate_requirements(&descriptors);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("'auth'"));
    }

    #[test]
    fn test_reverse_dependents() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::new("model").provides(&["model"]),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("api").requires(&["model"]),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("admin").requires(&["model"]),
            fixed_factory(true),
        );
        registry.register(Descriptor::new("docs"), fixed_factory(true));

        assert_eq!(registry.reverse_dependents("model"), vec!["api", "admin"]);
        assert!(registry.reverse_dependents("docs").is_empty());
        assert!(registry.reverse_dependents("missing").is_empty());
    }

    #[test]
    fn test_category_and_tag_indexes() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::new("rest").category("api").tags(&["http"]),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("ws").category("api").tags(&["http", "async"]),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("docker").category("deployment"),
            fixed_factory(true),
        );

        assert_eq!(registry.by_category("api"), vec!["rest", "ws"]);
        assert_eq!(registry.by_tag("async"), vec!["ws"]);
        assert!(registry.by_category("unknown").is_empty());
    }

    #[test]
    fn test_list_descriptors_sorted() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::new("ws").category("api").order(50),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("rest").category("api").order(10),
            fixed_factory(true),
        );
        registry.register(
            Descriptor::new("admin").category("app"),
            fixed_factory(true),
        );

        let names: Vec<_> = registry.list_descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["rest", "ws", "admin"]);
    }
}
