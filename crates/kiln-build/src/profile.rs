//! Compiler profile management
//!
//! Provides the typed compiler profile (version, IR pipeline, optimizer and
//! metadata policy) and the registry of global default profiles that files
//! without an override fall back to.

use crate::error::{BuildError, BuildResult};
use crate::pragma::VersionConstraint;
use kiln_config::CompilerConfig;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Optimizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Run the optimizer
    pub enabled: bool,
    /// Expected number of contract executions the optimizer tunes for
    pub runs: u32,
}

impl OptimizerSettings {
    /// Optimizer turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            runs: 200,
        }
    }

    /// Optimizer turned on with the given run count
    pub fn enabled(runs: u32) -> Self {
        Self {
            enabled: true,
            runs,
        }
    }

    /// Run count, only when the optimizer is on
    pub fn effective_runs(&self) -> Option<u32> {
        self.enabled.then_some(self.runs)
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

/// What the compiler appends to emitted bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataPolicy {
    /// Append the metadata hash (compiler default)
    #[default]
    Include,
    /// Strip the metadata hash for reproducible bytecode
    ExcludeHash,
}

impl MetadataPolicy {
    /// Value of `settings.metadata.bytecodeHash` in standard-json input
    pub fn bytecode_hash(&self) -> &'static str {
        match self {
            Self::Include => "ipfs",
            Self::ExcludeHash => "none",
        }
    }
}

/// A complete, validated compiler profile
///
/// Profiles are immutable values: registries and override tables only hand
/// out shared references or clones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerProfile {
    version: Version,
    via_ir: bool,
    optimizer: OptimizerSettings,
    metadata: MetadataPolicy,
}

impl CompilerProfile {
    /// Create a profile for `version` with compiler defaults
    pub fn new(version: Version) -> Self {
        Self {
            version,
            via_ir: false,
            optimizer: OptimizerSettings::default(),
            metadata: MetadataPolicy::default(),
        }
    }

    /// Parse the version and create a profile with compiler defaults
    pub fn parse(version: &str) -> BuildResult<Self> {
        let parsed = Version::parse(version.trim())
            .map_err(|e| BuildError::invalid_profile(version, format!("bad version: {}", e)))?;
        Ok(Self::new(parsed))
    }

    /// Build a profile from its configuration document form
    pub fn from_config(config: &CompilerConfig) -> BuildResult<Self> {
        let runs = u32::try_from(config.optimizer.runs).map_err(|_| {
            BuildError::invalid_profile(
                &config.version,
                format!(
                    "optimizer runs must be a non-negative 32-bit integer, got {}",
                    config.optimizer.runs
                ),
            )
        })?;

        let metadata = if config.metadata.excludes_hash() {
            MetadataPolicy::ExcludeHash
        } else {
            MetadataPolicy::Include
        };

        Ok(Self::parse(&config.version)?
            .with_via_ir(config.via_ir)
            .with_optimizer(OptimizerSettings {
                enabled: config.optimizer.enabled,
                runs,
            })
            .with_metadata(metadata))
    }

    /// Compile through the intermediate representation
    pub fn with_via_ir(mut self, via_ir: bool) -> Self {
        self.via_ir = via_ir;
        self
    }

    /// Set optimizer settings
    pub fn with_optimizer(mut self, optimizer: OptimizerSettings) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set metadata policy
    pub fn with_metadata(mut self, metadata: MetadataPolicy) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn via_ir(&self) -> bool {
        self.via_ir
    }

    pub fn optimizer(&self) -> OptimizerSettings {
        self.optimizer
    }

    pub fn metadata(&self) -> MetadataPolicy {
        self.metadata
    }

    /// Stable content hash used to key artifacts and group batches
    ///
    /// The run count only participates when the optimizer is on.
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "version": self.version.to_string(),
            "viaIR": self.via_ir,
            "optimizer": {
                "enabled": self.optimizer.enabled,
                "runs": self.optimizer.effective_runs(),
            },
            "bytecodeHash": self.metadata.bytecode_hash(),
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}

impl fmt::Display for CompilerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if self.via_ir {
            write!(f, " via-ir")?;
        }
        match self.optimizer.effective_runs() {
            Some(runs) => write!(f, " runs={}", runs)?,
            None => write!(f, " no-opt")?,
        }
        if self.metadata == MetadataPolicy::ExcludeHash {
            write!(f, " no-metadata-hash")?;
        }
        Ok(())
    }
}

/// Registry of global default compiler profiles
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    /// Profiles in registration order
    profiles: Vec<CompilerProfile>,
}

impl ProfileRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a profile from its configuration form
    pub fn register(&mut self, config: &CompilerConfig) -> BuildResult<&CompilerProfile> {
        let profile = CompilerProfile::from_config(config)?;
        Ok(self.insert(profile))
    }

    /// Register an already validated profile
    pub fn insert(&mut self, profile: CompilerProfile) -> &CompilerProfile {
        self.profiles.push(profile);
        &self.profiles[self.profiles.len() - 1]
    }

    /// Select the default profile for an optional version constraint
    ///
    /// Among the profiles the constraint accepts (all of them when there is
    /// no constraint), the highest version wins. Equal versions resolve to the
    /// one registered first.
    pub fn get_default(
        &self,
        constraint: Option<&VersionConstraint>,
    ) -> BuildResult<&CompilerProfile> {
        let mut best: Option<&CompilerProfile> = None;

        for profile in &self.profiles {
            if let Some(constraint) = constraint {
                if !constraint.matches(&profile.version) {
                    continue;
                }
            }
            match best {
                Some(current) if profile.version <= current.version => {}
                _ => best = Some(profile),
            }
        }

        best.ok_or_else(|| BuildError::NoCompatibleProfile {
            path: None,
            requirement: constraint
                .map(|c| c.to_string())
                .unwrap_or_else(|| "*".to_string()),
            available: self.versions(),
        })
    }

    /// Registered versions, in registration order
    pub fn versions(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.version.to_string()).collect()
    }

    /// All registered profiles
    pub fn profiles(&self) -> &[CompilerProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
