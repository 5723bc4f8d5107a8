//! Build command - resolve profiles and run the compile pipeline

use crate::exit_codes::KilnExitCode;
use anyhow::{Context, Result};
use colored::Colorize;
use kiln_build::{BatchOutcome, BuildError, BuildReport, BuildSettings, Builder, SolcCommand, Verdict};
use std::path::PathBuf;

/// Build command arguments
#[derive(Debug, Default)]
pub struct BuildArgs {
    /// Network profile to validate against
    pub network: Option<String>,
    /// Sources directory override
    pub sources: Option<PathBuf>,
    /// Explicit kiln.toml
    pub config: Option<PathBuf>,
    /// Number of parallel compile jobs
    pub jobs: Option<usize>,
    /// JSON output
    pub json: bool,
    /// Quiet output (errors only)
    pub quiet: bool,
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
}

/// Run the build command, returning the process exit code
pub fn run(args: BuildArgs) -> Result<i32> {
    let config = super::load_config(
        args.config.as_deref(),
        args.project_dir.as_deref(),
        args.sources.as_deref(),
    )?;
    let settings = BuildSettings::from_config(&config, args.network.as_deref())
        .context("Invalid build configuration")?;

    let solc = SolcCommand::from_config(&settings.compiler, &settings.remappings);
    let mut builder = Builder::new(settings, solc);
    if let Some(jobs) = args.jobs {
        builder = builder.with_jobs(jobs);
    }

    match builder.build() {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !args.quiet {
                print_report(&report);
            }
            Ok(KilnExitCode::for_status(report.status))
        }
        Err(BuildError::SizeLimitExceeded {
            network,
            limit,
            offenders,
            report,
        }) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            eprintln!(
                "{} {} artifact(s) exceed the {} byte limit of network '{}'",
                "error:".red().bold(),
                offenders.len(),
                limit,
                network
            );
            for record in report.records.iter().filter(|r| r.verdict == Verdict::Fail) {
                eprintln!("  {} ({} bytes)", record.artifact, record.size);
            }
            Ok(KilnExitCode::FATAL)
        }
        Err(e) => Err(e).context("Build failed"),
    }
}

fn print_report(report: &BuildReport) {
    for batch in &report.batches {
        match &batch.outcome {
            BatchOutcome::Compiled { contracts } => println!(
                "{:>10} {} ({} file(s), {} contract(s))",
                "Compiled".green().bold(),
                batch.profile,
                batch.files.len(),
                contracts
            ),
            BatchOutcome::Failed { diagnostics } => {
                println!(
                    "{:>10} {} ({} file(s))",
                    "Failed".red().bold(),
                    batch.profile,
                    batch.files.len()
                );
                for file in &batch.files {
                    println!("           {}", file.dimmed());
                }
                for diagnostic in diagnostics {
                    println!("{}", diagnostic);
                }
            }
        }
    }

    for record in report
        .validation
        .records
        .iter()
        .filter(|r| r.verdict == Verdict::Warn)
    {
        println!(
            "{:>10} {} is {} bytes (limit {})",
            "Warning".yellow().bold(),
            record.artifact,
            record.size,
            record.limit
        );
    }

    let stats = &report.stats;
    let headline = if report.is_success() {
        "Finished".green().bold()
    } else {
        "Finished".yellow().bold()
    };
    println!(
        "{:>10} {} contract(s) from {} source(s) in {} batch(es), {} failed, in {:.2}s",
        headline,
        stats.contracts,
        stats.sources,
        stats.batches,
        stats.failed_batches,
        stats.total_time.as_secs_f64()
    );
    println!("{:>10} {}", "Cache".cyan(), report.cache_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_default() {
        let args = BuildArgs::default();
        assert!(args.network.is_none());
        assert!(args.jobs.is_none());
        assert!(!args.json);
    }

    #[test]
    fn test_missing_config_file() {
        let args = BuildArgs {
            config: Some(PathBuf::from("/nonexistent/kiln.toml")),
            ..Default::default()
        };
        let err = run(args).unwrap_err();
        assert_eq!(KilnExitCode::for_error(&err), KilnExitCode::CONFIG_ERROR);
    }
}
