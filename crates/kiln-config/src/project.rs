//! Project Configuration (kiln.toml)
//!
//! Handles the project-level document stored in `kiln.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Tool name used for the cache namespace (default: "kiln")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Network selected when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_network: Option<String>,

    /// Source and cache directories
    #[serde(default)]
    pub paths: PathsConfig,

    /// Global default compiler profiles
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compilers: Vec<CompilerConfig>,

    /// Per-file compiler profiles, keyed by source path relative to the project root
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, CompilerConfig>,

    /// Named network profiles
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// External compiler invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerCommandConfig>,

    /// Source preprocessing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocess: Option<PreprocessConfig>,

    /// Pipeline tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Source directory (default: "src")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<PathBuf>,

    /// Cache directory (default: "cache_<tool>")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<PathBuf>,
}

/// A compiler profile as written in the document
///
/// `runs` is signed so that a negative value survives parsing and can be
/// reported as an invalid profile instead of a TOML type error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Compiler version (semver)
    pub version: String,

    /// Compile through the intermediate representation
    #[serde(default)]
    pub via_ir: bool,

    /// Optimizer settings
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Output metadata settings
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_runs")]
    pub runs: i64,
}

fn default_runs() -> i64 {
    200
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: default_runs(),
        }
    }
}

/// Output metadata settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Hash appended to the bytecode ("none" drops it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytecode_hash: Option<String>,
}

impl MetadataConfig {
    /// Whether the metadata hash is stripped from emitted bytecode
    pub fn excludes_hash(&self) -> bool {
        self.bytecode_hash.as_deref() == Some("none")
    }
}

/// Network profile configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Allow artifacts above the size limit
    #[serde(default)]
    pub allow_unlimited_contract_size: bool,

    /// Size limit in bytes (default: 24576)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_artifact_size: Option<u64>,
}

/// External compiler command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompilerCommandConfig {
    /// Program to run; `{version}` is replaced by the profile version
    #[serde(default = "default_compiler_command")]
    pub command: String,

    /// Extra arguments passed before `--standard-json`
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

fn default_compiler_command() -> String {
    "solc".to_string()
}

impl Default for CompilerCommandConfig {
    fn default() -> Self {
        Self {
            command: default_compiler_command(),
            args: Vec::new(),
        }
    }
}

/// Source preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Import remappings in `prefix=target` form
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<String>,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Maximum parallel compile batches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Retries for transient artifact write failures (default: 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_write_retries: Option<u32>,

    /// Delay between artifact write retries in milliseconds (default: 50)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    /// Emit Solidity interface stubs alongside ABIs (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<bool>,
}

/// Upper bound for `build.artifact_write_retries`
pub const MAX_ARTIFACT_WRITE_RETRIES: u32 = 100;

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the document shape
    ///
    /// Profile contents (versions, runs) are checked by the profile registry.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(tool) = &self.tool {
            if !is_valid_tool_name(tool) {
                return Err(ConfigError::InvalidValue {
                    field: "tool".to_string(),
                    reason: format!(
                        "'{}' must be non-empty and contain only letters, digits, '-' or '_'",
                        tool
                    ),
                });
            }
        }

        if let Some(network) = &self.default_network {
            if network.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "default_network".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        for (name, network) in &self.networks {
            if network.max_artifact_size == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("networks.{}.max_artifact_size", name),
                    reason: "limit must be greater than zero".to_string(),
                });
            }
        }

        if let Some(compiler) = &self.compiler {
            if compiler.command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "compiler.command".to_string(),
                    reason: "command cannot be empty".to_string(),
                });
            }
        }

        if let Some(preprocess) = &self.preprocess {
            for remapping in &preprocess.remappings {
                if !is_valid_remapping(remapping) {
                    return Err(ConfigError::InvalidValue {
                        field: "preprocess.remappings".to_string(),
                        reason: format!("'{}' is not of the form prefix=target", remapping),
                    });
                }
            }
        }

        if let Some(build) = &self.build {
            if build.jobs == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "build.jobs".to_string(),
                    reason: "jobs must be at least 1".to_string(),
                });
            }
            if let Some(retries) = build.artifact_write_retries {
                if retries > MAX_ARTIFACT_WRITE_RETRIES {
                    return Err(ConfigError::InvalidValue {
                        field: "build.artifact_write_retries".to_string(),
                        reason: format!(
                            "{} exceeds the maximum of {}",
                            retries, MAX_ARTIFACT_WRITE_RETRIES
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    /// Get the tool name, if present
    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    /// Remappings declared for the preprocessor
    pub fn remappings(&self) -> &[String] {
        self.preprocess
            .as_ref()
            .map(|p| p.remappings.as_slice())
            .unwrap_or(&[])
    }
}

/// Tool names become directory names, so keep them to a safe alphabet
pub(crate) fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_valid_remapping(remapping: &str) -> bool {
    match remapping.split_once('=') {
        Some((prefix, target)) => !prefix.is_empty() && !target.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_project_config() {
        let toml = r#"
[[compilers]]
version = "0.8.18"
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.compilers.len(), 1);
        assert_eq!(config.compilers[0].version, "0.8.18");
        assert!(!config.compilers[0].optimizer.enabled);
        assert_eq!(config.compilers[0].optimizer.runs, 200);
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_parse_full_project_config() {
        let toml = r#"
tool = "hardhat"
default_network = "hardhat"

[paths]
sources = "src"
cache = "cache_hardhat"

[[compilers]]
version = "0.8.18"
via_ir = true
optimizer = { enabled = true, runs = 1000000 }
metadata = { bytecode_hash = "none" }

[overrides."src/talos/TalosStrategyVanilla.sol"]
version = "0.8.18"
via_ir = true
optimizer = { enabled = true, runs = 200 }
metadata = { bytecode_hash = "none" }

[networks.hardhat]
allow_unlimited_contract_size = false

[compiler]
command = "solc-{version}"

[preprocess]
remappings = ["@openzeppelin/=lib/openzeppelin-contracts/"]

[build]
jobs = 4
artifact_write_retries = 5
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.tool_name(), Some("hardhat"));
        assert_eq!(config.compilers[0].optimizer.runs, 1_000_000);
        assert!(config.compilers[0].metadata.excludes_hash());
        let over = &config.overrides["src/talos/TalosStrategyVanilla.sol"];
        assert_eq!(over.optimizer.runs, 200);
        assert!(!config.networks["hardhat"].allow_unlimited_contract_size);
        assert_eq!(config.remappings().len(), 1);
        assert_eq!(config.build.as_ref().unwrap().jobs, Some(4));
    }

    #[test]
    fn test_negative_runs_survive_parsing() {
        let toml = r#"
[[compilers]]
version = "0.8.18"
optimizer = { enabled = true, runs = -1 }
"#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.compilers[0].optimizer.runs, -1);
    }

    #[test]
    fn test_retry_count_is_bounded() {
        let at_limit: ProjectConfig =
            toml::from_str("[build]\nartifact_write_retries = 100\n").unwrap();
        assert!(at_limit.validate().is_ok());

        let config: ProjectConfig =
            toml::from_str("[build]\nartifact_write_retries = 4294967295\n").unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "build.artifact_write_retries")
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_name_validation() {
        assert!(is_valid_tool_name("hardhat"));
        assert!(is_valid_tool_name("forge_2"));
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name("../escape"));
        assert!(!is_valid_tool_name("with space"));
    }

    #[test]
    fn test_remapping_validation() {
        assert!(is_valid_remapping("@oz/=lib/oz/"));
        assert!(!is_valid_remapping("no-equals"));
        assert!(!is_valid_remapping("=target"));
        assert!(!is_valid_remapping("prefix="));
    }

    #[test]
    fn test_metadata_hash_policy() {
        let none = MetadataConfig {
            bytecode_hash: Some("none".to_string()),
        };
        let ipfs = MetadataConfig {
            bytecode_hash: Some("ipfs".to_string()),
        };
        assert!(none.excludes_hash());
        assert!(!ipfs.excludes_hash());
        assert!(!MetadataConfig::default().excludes_hash());
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let config = ProjectConfig {
            build: Some(BuildConfig {
                jobs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
