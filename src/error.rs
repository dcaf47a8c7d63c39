//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `codeforge` engine. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the engine. Each variant corresponds to a specific type of
//!   error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the crate to simplify function signatures.
//!
//! ## Propagation Policy
//!
//! Only two error kinds abort a generation run outright with zero side
//! effects: `Config` (raised before any generator runs) and `CycleDetected`
//! (raised at planning time). Every other failure mode (a generator that
//! fails mid-run, an unsatisfied capability requirement, a write conflict, a
//! plugin that refuses to initialize) is accumulated in the run's
//! [`GenerationContext`](crate::context::GenerationContext) or report and
//! returned to the caller, who decides success purely from "is the error
//! list empty". Errors never escape `Engine::generate` for those cases.

use thiserror::Error;

/// Main error type for codeforge operations
#[derive(Error, Debug)]
pub enum Error {
    /// The generation configuration was rejected before any generator ran.
    ///
    /// This error includes the specific issue and optionally a hint about
    /// how to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A circular dependency was detected among the selected generators.
    ///
    /// Planning fails hard here; a silent fallback ordering would let a
    /// broken dependency plan execute with a misleading order.
    #[error("Cycle detected among generators: {cycle}")]
    CycleDetected { cycle: String },

    /// A generator (or its factory) failed.
    #[error("Generator '{generator}' error: {message}")]
    Generator { generator: String, message: String },

    /// An artifact could not be committed to the output tree.
    #[error("Write error for '{path}': {message}")]
    Write { path: String, message: String },

    /// A plugin failed to load, configure, or initialize.
    ///
    /// The plugin is excluded from the run; everything else proceeds.
    #[error("Plugin '{plugin}' failed to load: {message}")]
    PluginLoad { plugin: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::Config {
            message: "missing project name".to_string(),
            hint: None,
        };
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("missing project name"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::Config {
            message: "missing project name".to_string(),
            hint: Some("add a 'project:' key".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("hint:"));
        assert!(display.contains("add a 'project:' key"));
    }

    #[test]
    fn test_error_display_cycle_detected() {
        let error = Error::CycleDetected {
            cycle: "api, model".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Cycle detected"));
        assert!(display.contains("api, model"));
    }

    #[test]
    fn test_error_display_generator() {
        let error = Error::Generator {
            generator: "model".to_string(),
            message: "template missing".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Generator 'model'"));
        assert!(display.contains("template missing"));
    }

    #[test]
    fn test_error_display_plugin_load() {
        let error = Error::PluginLoad {
            plugin: "extra-gens".to_string(),
            message: "init failed".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Plugin 'extra-gens'"));
        assert!(display.contains("init failed"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_str = "invalid: [unclosed";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: Error = yaml_error.into();
        let display = format!("{}", error);
        assert!(display.contains("YAML parsing error"));
    }
}
