//! Plan command - show which profile each source resolves to

use anyhow::{Context, Result};
use colored::Colorize;
use kiln_build::{BuildSettings, Builder, PlanSummary, ProfileSource, SolcCommand};
use std::path::PathBuf;

use crate::exit_codes::KilnExitCode;

/// Plan command arguments
#[derive(Debug, Default)]
pub struct PlanArgs {
    pub sources: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub project_dir: Option<PathBuf>,
}

/// Resolve the build plan without compiling anything
pub fn run(args: PlanArgs) -> Result<i32> {
    let config = super::load_config(
        args.config.as_deref(),
        args.project_dir.as_deref(),
        args.sources.as_deref(),
    )?;
    let settings =
        BuildSettings::from_config(&config, None).context("Invalid build configuration")?;
    let solc = SolcCommand::from_config(&settings.compiler, &settings.remappings);

    let (_, plan) = Builder::new(settings, solc)
        .plan()
        .context("Failed to resolve build plan")?;
    let summary = plan.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(KilnExitCode::OK)
}

fn print_summary(summary: &PlanSummary) {
    let width = summary
        .files
        .iter()
        .map(|f| f.path.len())
        .max()
        .unwrap_or(0);

    for entry in &summary.files {
        let source = match entry.source {
            ProfileSource::Override => "override".yellow(),
            ProfileSource::Default => "default".normal(),
        };
        println!(
            "{:<width$}  {}  {} [{}]",
            entry.path,
            entry.profile_hash.dimmed(),
            entry.profile,
            source,
            width = width
        );
    }
    println!(
        "\n{} file(s) in {} batch(es)",
        summary.files.len(),
        summary.batches.len()
    );
}
