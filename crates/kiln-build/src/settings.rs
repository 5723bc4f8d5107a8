//! Immutable per-run build settings
//!
//! Everything that can be wrong with the configuration is reported here,
//! before a single source file is read.

use crate::environment::{EnvironmentSelector, NetworkProfile};
use crate::error::{BuildError, BuildResult};
use crate::overrides::OverrideTable;
use crate::profile::{CompilerProfile, ProfileRegistry};
use crate::resolver::PathResolver;
use crate::sources::normalize_source_key;
use crate::stages::{RemappingPreprocessor, RetryPolicy};
use kiln_config::{CompilerCommandConfig, Config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Where sources are read from and where the cache lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    pub project_root: PathBuf,
    pub sources_root: PathBuf,
    /// Explicit cache directory; `None` derives `cache_<tool>`
    pub cache_root: Option<PathBuf>,
}

/// Validated configuration for one build run
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub tool: String,
    pub paths: PathConfig,
    pub registry: ProfileRegistry,
    pub overrides: OverrideTable,
    pub network: NetworkProfile,
    pub compiler: CompilerCommandConfig,
    pub remappings: Vec<String>,
    pub jobs: usize,
    pub retry: RetryPolicy,
    pub interfaces: bool,
}

impl BuildSettings {
    /// Build settings from a loaded configuration
    ///
    /// `network` selects the network profile; `None` uses the configured
    /// default.
    pub fn from_config(config: &Config, network: Option<&str>) -> BuildResult<Self> {
        let project = &config.project;

        if project.compilers.is_empty() {
            return Err(BuildError::invalid_profile(
                "compilers",
                "at least one [[compilers]] entry is required",
            ));
        }
        let mut registry = ProfileRegistry::new();
        for compiler in &project.compilers {
            registry.register(compiler)?;
        }

        let mut overrides = OverrideTable::new();
        for (path, compiler) in &project.overrides {
            let profile = CompilerProfile::from_config(compiler)?;
            overrides.add_override(normalize_source_key(path), profile)?;
        }

        let selector =
            EnvironmentSelector::from_config(&project.networks, project.default_network.as_deref());
        let network = selector.select(network)?;

        // Checked here so a bad remapping fails before discovery
        RemappingPreprocessor::parse(project.remappings())?;

        let build = project.build.clone().unwrap_or_default();
        let jobs = build.jobs.unwrap_or_else(default_jobs);
        let retry = RetryPolicy::new(
            build
                .artifact_write_retries
                .unwrap_or(RetryPolicy::DEFAULT_COUNT),
            build
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(RetryPolicy::DEFAULT_DELAY),
        );

        let settings = Self {
            tool: config.tool_name().to_string(),
            paths: PathConfig {
                project_root: config.project_root().to_path_buf(),
                sources_root: config.sources_dir(),
                cache_root: config.cache_dir(),
            },
            registry,
            overrides,
            network,
            compiler: project.compiler.clone().unwrap_or_default(),
            remappings: project.remappings().to_vec(),
            jobs,
            retry,
            interfaces: build.interfaces.unwrap_or(true),
        };

        debug!(
            tool = %settings.tool,
            defaults = settings.registry.len(),
            overrides = settings.overrides.len(),
            network = %settings.network.name,
            jobs = settings.jobs,
            "build settings ready"
        );
        Ok(settings)
    }

    /// Resolver over this run's registry and override table
    pub fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.registry, &self.overrides)
    }

    /// Preprocessor for the configured remappings, if any
    pub fn remapping_preprocessor(&self) -> BuildResult<Option<RemappingPreprocessor>> {
        let remapper = RemappingPreprocessor::parse(&self.remappings)?;
        Ok((!remapper.is_empty()).then_some(remapper))
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::ProjectConfig;

    fn config(toml_src: &str) -> Config {
        let project: ProjectConfig = toml::from_str(toml_src).unwrap();
        Config {
            project,
            project_root: Some(PathBuf::from("/project")),
            config_path: None,
        }
    }

    const BASE: &str = r#"
        [[compilers]]
        version = "0.8.18"
        via_ir = true
        optimizer = { enabled = true, runs = 1000000 }
        metadata = { bytecode_hash = "none" }
    "#;

    #[test]
    fn test_defaults() {
        let settings = BuildSettings::from_config(&config(BASE), None).unwrap();
        assert_eq!(settings.tool, "kiln");
        assert_eq!(settings.paths.sources_root, PathBuf::from("/project/src"));
        assert_eq!(settings.paths.cache_root, None);
        assert_eq!(settings.network.name, "local");
        assert!(settings.network.enforce_size_limit);
        assert_eq!(settings.retry, RetryPolicy::default());
        assert!(settings.interfaces);
        assert!(settings.jobs >= 1);
        assert_eq!(settings.compiler.command, "solc");
    }

    #[test]
    fn test_override_keys_normalized() {
        let src = format!(
            "{}\n[overrides.\"./src/A.sol\"]\nversion = \"0.8.18\"\noptimizer = {{ enabled = true, runs = 200 }}\n",
            BASE
        );
        let settings = BuildSettings::from_config(&config(&src), None).unwrap();
        assert!(settings.overrides.lookup("src/A.sol").is_some());
    }

    #[test]
    fn test_colliding_override_keys() {
        let src = format!(
            "{}\n[overrides.\"./src/A.sol\"]\nversion = \"0.8.18\"\n[overrides.\"src/A.sol\"]\nversion = \"0.8.18\"\n",
            BASE
        );
        let err = BuildSettings::from_config(&config(&src), None).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateOverride { .. }));
    }

    #[test]
    fn test_empty_compilers() {
        let err = BuildSettings::from_config(&config(""), None).unwrap_err();
        assert!(matches!(err, BuildError::InvalidProfile { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unknown_network() {
        let err = BuildSettings::from_config(&config(BASE), Some("mainnet")).unwrap_err();
        assert!(matches!(err, BuildError::UnknownNetworkProfile { .. }));
    }

    #[test]
    fn test_build_section() {
        let src = format!(
            "{}\n[build]\njobs = 2\nartifact_write_retries = 5\nretry_delay_ms = 0\ninterfaces = false\n",
            BASE
        );
        let settings = BuildSettings::from_config(&config(&src), None).unwrap();
        assert_eq!(settings.jobs, 2);
        assert_eq!(settings.retry, RetryPolicy::new(5, Duration::ZERO));
        assert!(!settings.interfaces);
    }
}
