pub mod build;
pub mod plan;

use anyhow::{Context, Result};
use kiln_config::{Config, ConfigLoader};
use std::path::{Path, PathBuf};

/// Load `--config` if given, otherwise search upwards from `project_dir`
pub fn load_config(
    config_file: Option<&Path>,
    project_dir: Option<&Path>,
    sources: Option<&Path>,
) -> Result<Config> {
    let loader = ConfigLoader::new();
    let mut config = match config_file {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let start = match project_dir {
                Some(dir) => dir.to_path_buf(),
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            loader
                .load_from_directory(&start)
                .context("Failed to load configuration")?
        }
    };

    if let Some(sources) = sources {
        config.set_sources_dir(PathBuf::from(sources));
    }
    Ok(config)
}
