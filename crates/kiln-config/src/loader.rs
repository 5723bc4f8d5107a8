//! Configuration Loader
//!
//! Handles finding `kiln.toml` and layering environment overrides on top of it.

use crate::project::{BuildConfig, ProjectConfig};
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Default tool name for the cache namespace
pub const DEFAULT_TOOL_NAME: &str = "kiln";

/// Configuration loader
///
/// Loads configuration and merges it with proper precedence:
/// 1. Project config (./kiln.toml) - lowest priority
/// 2. Environment variables (KILN_*) - overrides project
/// 3. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip `KILN_*` environment overrides
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where kiln.toml was found)
    pub project_root: Option<PathBuf>,

    /// Path of the loaded document
    pub config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Disable `KILN_*` environment overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml. When none is found the
    /// default (empty) document is used, rooted at `start_dir`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (config_path, project_config) = self.find_project_config(start_dir)?;

        let project_root = match &config_path {
            Some(path) => Some(parent_dir(path)),
            None => Some(start_dir.to_path_buf()),
        };

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            project_root,
            config_path,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            project_root: Some(parent_dir(config_path)),
            config_path: Some(config_path.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(config_path), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized variables: KILN_NETWORK, KILN_SOURCES, KILN_CACHE, KILN_JOBS
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(network) = env::var("KILN_NETWORK") {
            if !network.is_empty() {
                config.default_network = Some(network);
            }
        }

        if let Ok(sources) = env::var("KILN_SOURCES") {
            if !sources.is_empty() {
                config.paths.sources = Some(PathBuf::from(sources));
            }
        }

        if let Ok(cache) = env::var("KILN_CACHE") {
            if !cache.is_empty() {
                config.paths.cache = Some(PathBuf::from(cache));
            }
        }

        if let Ok(jobs) = env::var("KILN_JOBS") {
            let parsed = jobs
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: "KILN_JOBS".to_string(),
                    value: jobs.clone(),
                    reason: "expected a positive integer".to_string(),
                })?;
            config
                .build
                .get_or_insert_with(BuildConfig::default)
                .jobs = Some(parsed);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Directory holding `config_path`; `.` for a bare file name
fn parent_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> &Path {
        self.project_root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Check if this is a project (has kiln.toml)
    pub fn is_project(&self) -> bool {
        self.config_path.is_some()
    }

    /// Tool name used for the cache namespace
    pub fn tool_name(&self) -> &str {
        self.project.tool_name().unwrap_or(DEFAULT_TOOL_NAME)
    }

    /// Effective sources directory, resolved against the project root
    pub fn sources_dir(&self) -> PathBuf {
        let sources = self
            .project
            .paths
            .sources
            .clone()
            .unwrap_or_else(|| PathBuf::from("src"));
        self.resolve(sources)
    }

    /// Explicit cache directory, resolved against the project root
    ///
    /// `None` means the cache namespace manager derives one from the tool name.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.project.paths.cache.clone().map(|p| self.resolve(p))
    }

    /// Override the sources directory (CLI `--sources`)
    pub fn set_sources_dir(&mut self, sources: impl Into<PathBuf>) {
        self.project.paths.sources = Some(sources.into());
    }

    /// Override the default network (CLI `--network`)
    pub fn set_network(&mut self, network: impl Into<String>) {
        self.project.default_network = Some(network.into());
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.project_root().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
tool = "hardhat"

[[compilers]]
version = "0.8.18"
"#,
        );

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.tool_name(), "hardhat");
        assert!(config.is_project());
        assert_eq!(config.project_root(), temp_dir.path());
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "tool = \"parent\"\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(&sub_dir)
            .unwrap();

        assert_eq!(config.tool_name(), "parent");
        assert_eq!(config.project_root(), temp_dir.path());
    }

    #[test]
    fn test_no_project_config() {
        let temp_dir = TempDir::new().unwrap();

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert!(!config.is_project());
        assert_eq!(config.tool_name(), DEFAULT_TOOL_NAME);
        assert_eq!(config.sources_dir(), temp_dir.path().join("src"));
        assert!(config.cache_dir().is_none());
    }

    #[test]
    #[serial]
    fn test_env_override_network() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "default_network = \"hardhat\"\n");

        env::set_var("KILN_NETWORK", "mainnet");

        let config = ConfigLoader::new()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.project.default_network.as_deref(), Some("mainnet"));

        env::remove_var("KILN_NETWORK");
    }

    #[test]
    #[serial]
    fn test_env_override_jobs_invalid() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        env::set_var("KILN_JOBS", "zero");

        let result = ConfigLoader::new().load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));

        env::remove_var("KILN_JOBS");
    }

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[paths]
sources = "contracts"
cache = "cache_custom"
"#,
        );

        let config = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.sources_dir(), temp_dir.path().join("contracts"));
        assert_eq!(
            config.cache_dir(),
            Some(temp_dir.path().join("cache_custom"))
        );
    }
}
