//! Kiln Configuration System
//!
//! Provides configuration management for kiln projects including:
//! - The project document (`kiln.toml`)
//! - Configuration discovery by walking up from a start directory
//! - Environment variable overrides (`KILN_*`)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Project config (./kiln.toml)
//! 2. Environment variables (KILN_*)
//! 3. CLI flags (applied by the caller)
//!
//! The document is only checked for shape here. Compiler profiles, overrides
//! and networks are validated when `kiln-build` turns the document into build
//! settings.
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("sources: {}", config.sources_dir().display());
//! ```

pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid environment variable {var}={value}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use project::{
    BuildConfig, CompilerCommandConfig, CompilerConfig, MetadataConfig, NetworkConfig,
    OptimizerConfig, PathsConfig, PreprocessConfig, ProjectConfig, MAX_ARTIFACT_WRITE_RETRIES,
};
