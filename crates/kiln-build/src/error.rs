/// Build system error types
use crate::validation::ValidationReport;
use kiln_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid compiler profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error(
        "No compatible compiler profile for {}: requirement '{requirement}' not satisfied by {available:?}",
        .path.as_deref().unwrap_or("default lookup")
    )]
    NoCompatibleProfile {
        path: Option<String>,
        requirement: String,
        available: Vec<String>,
    },

    #[error("Duplicate compiler override for '{path}'")]
    DuplicateOverride { path: String },

    #[error("Unknown network profile '{name}' (available: {available:?})")]
    UnknownNetworkProfile { name: String, available: Vec<String> },

    #[error("Cache directory {path} is already claimed by {holder}; cannot hand it to {claimant}")]
    CacheConflict {
        path: PathBuf,
        holder: String,
        claimant: String,
    },

    #[error("Cache directory {path} is locked by another build ({owner}); remove {lock} if no build is running")]
    CacheBusy {
        path: PathBuf,
        lock: PathBuf,
        owner: String,
    },

    #[error("Preprocessor '{hook}' failed on {path}: {error}")]
    PreprocessFailed {
        hook: String,
        path: String,
        error: String,
    },

    #[error("Artifacts exceed the {limit} byte size limit of network '{network}': {offenders:?}")]
    SizeLimitExceeded {
        network: String,
        limit: u64,
        offenders: Vec<String>,
        report: Box<ValidationReport>,
    },

    #[error("Failed to write artifact {path} after {attempts} attempts: {error}")]
    ArtifactWriteFailed {
        path: PathBuf,
        attempts: u32,
        error: std::io::Error,
    },

    #[error("Source discovery failed in {path}: {reason}")]
    SourceDiscovery { path: PathBuf, reason: String },

    #[error("Build cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Build failed: {0}")]
    BuildFailed(String),
}

impl BuildError {
    /// Create an invalid profile error
    pub fn invalid_profile(profile: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidProfile {
            profile: profile.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a preprocess failure
    pub fn preprocess(hook: impl Into<String>, path: impl Into<String>, error: impl ToString) -> Self {
        Self::PreprocessFailed {
            hook: hook.into(),
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Attach the source path to a profile lookup failure
    pub fn for_path(self, source_path: &str) -> Self {
        match self {
            Self::NoCompatibleProfile {
                path: None,
                requirement,
                available,
            } => Self::NoCompatibleProfile {
                path: Some(source_path.to_string()),
                requirement,
                available,
            },
            other => other,
        }
    }

    /// Errors detected while loading configuration, before any compilation
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidProfile { .. }
                | Self::NoCompatibleProfile { .. }
                | Self::DuplicateOverride { .. }
                | Self::UnknownNetworkProfile { .. }
                | Self::CacheConflict { .. }
                | Self::Config(_)
        )
    }
}
