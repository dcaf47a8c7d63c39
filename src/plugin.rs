//! # Plugin Management
//!
//! Externally supplied generators arrive through plugins. A plugin is a
//! value implementing the [`Plugin`] trait: an explicit registration
//! contract with one well-known entry point per concern, invoked
//! deliberately by the [`PluginManager`]. There is no ambient scanning or
//! reflective class discovery.
//!
//! ## Lifecycle
//!
//! Per plugin: register (the host hands the manager a boxed plugin) →
//! `configure(options)` → `initialize()` → contribute (the manager merges
//! the plugin's descriptors/factories into the registry and collects its
//! post-run hooks) → `cleanup()` on unload.
//!
//! A failure in `configure` or `initialize` marks the plugin as failed, is
//! logged and reported, and the plugin's generators are not registered, but
//! it never aborts the overall loading pass. Everything else proceeds.
//!
//! ## Manifest Discovery
//!
//! Hosts may drive loading from a YAML manifest listing enabled plugin names
//! and per-plugin options:
//!
//! ```yaml
//! plugins:
//!   - name: enterprise
//!     options:
//!       tenant_model: true
//!   - name: monitoring
//! ```
//!
//! Only listed plugins load; a listed name with no registered plugin is
//! reported as a load error.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::context::GenerationContext;
use crate::error::{Error, Result};
use crate::generator::{Descriptor, GeneratorFactory};
use crate::registry::Registry;

/// Identity metadata a plugin reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
        }
    }
}

/// A hook invoked after the scheduler finishes, success or failure.
pub type PostRunHook = Box<dyn Fn(&GenerationContext) -> Result<()> + Send + Sync>;

/// The contract every plugin implements.
///
/// All methods except `info` and `generators` have do-nothing defaults so
/// simple plugins stay simple.
pub trait Plugin: Send {
    fn info(&self) -> PluginInfo;

    /// Receive plugin-specific settings before initialization.
    fn configure(&mut self, _options: &serde_yaml::Value) -> Result<()> {
        Ok(())
    }

    /// Perform the plugin's own setup. Failure excludes the plugin.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Generator descriptors and factories this plugin contributes.
    fn generators(&self) -> Vec<(Descriptor, GeneratorFactory)>;

    /// Post-run hooks this plugin contributes.
    fn post_run_hooks(&self) -> Vec<PostRunHook> {
        Vec::new()
    }

    /// Release resources on unload.
    fn cleanup(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluginState {
    Registered,
    Loaded,
    Failed,
}

struct ManagedPlugin {
    plugin: Box<dyn Plugin>,
    state: PluginState,
}

/// Manifest selecting which registered plugins load, with options.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl PluginManifest {
    /// Read a manifest from a YAML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Owns registered plugins and drives their lifecycle.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<ManagedPlugin>,
    hooks: Vec<PostRunHook>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Nothing runs until a load pass.
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(ManagedPlugin {
            plugin,
            state: PluginState::Registered,
        });
    }

    /// Load every registered plugin with empty options.
    ///
    /// Returns the load failures; failed plugins are skipped, never fatal.
    pub fn load_all(&mut self, registry: &mut Registry) -> Vec<Error> {
        let names: Vec<String> = self
            .plugins
            .iter()
            .map(|m| m.plugin.info().name)
            .collect();
        let mut failures = Vec::new();
        for name in names {
            if let Err(e) = self.load_one(&name, &serde_yaml::Value::Null, registry) {
                failures.push(e);
            }
        }
        failures
    }

    /// Load only the plugins a manifest enables, with their options.
    pub fn load_from_manifest(
        &mut self,
        manifest: &PluginManifest,
        registry: &mut Registry,
    ) -> Vec<Error> {
        let mut failures = Vec::new();
        for entry in &manifest.plugins {
            if let Err(e) = self.load_one(&entry.name, &entry.options, registry) {
                failures.push(e);
            }
        }
        failures
    }

    fn load_one(
        &mut self,
        name: &str,
        options: &serde_yaml::Value,
        registry: &mut Registry,
    ) -> Result<()> {
        let managed = self
            .plugins
            .iter_mut()
            .find(|m| m.plugin.info().name == name)
            .ok_or_else(|| Error::PluginLoad {
                plugin: name.to_string(),
                message: "no plugin registered under this name".to_string(),
            })?;

        match managed.state {
            PluginState::Loaded => {
                warn!("plugin '{}' is already loaded", name);
                return Ok(());
            }
            PluginState::Failed => {
                return Err(Error::PluginLoad {
                    plugin: name.to_string(),
                    message: "plugin previously failed to load".to_string(),
                });
            }
            PluginState::Registered => {}
        }

        if !options.is_null() {
            if let Err(e) = managed.plugin.configure(options) {
                managed.state = PluginState::Failed;
                let err = Error::PluginLoad {
                    plugin: name.to_string(),
                    message: format!("configure failed: {}", e),
                };
                warn!("{}", err);
                return Err(err);
            }
        }

        if let Err(e) = managed.plugin.initialize() {
            managed.state = PluginState::Failed;
            let err = Error::PluginLoad {
                plugin: name.to_string(),
                message: format!("initialize failed: {}", e),
            };
            warn!("{}", err);
            return Err(err);
        }

        managed.state = PluginState::Loaded;
        let contributed = managed.plugin.generators();
        let hooks = managed.plugin.post_run_hooks();
        let count = contributed.len();
        for (descriptor, factory) in contributed {
            registry.register(descriptor, factory);
        }
        self.hooks.extend(hooks);
        info!("loaded plugin '{}' ({} generators)", name, count);
        Ok(())
    }

    /// Post-run hooks contributed by every loaded plugin.
    pub fn post_run_hooks(&self) -> &[PostRunHook] {
        &self.hooks
    }

    /// Names and states for reporting.
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|m| m.state == PluginState::Loaded)
            .map(|m| m.plugin.info().name)
            .collect()
    }

    /// Unload every loaded plugin, invoking `cleanup` on each.
    pub fn unload_all(&mut self) {
        for managed in &mut self.plugins {
            if managed.state == PluginState::Loaded {
                managed.plugin.cleanup();
                managed.state = PluginState::Registered;
            }
        }
        self.hooks.clear();
    }
}
