use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod exit_codes;
mod output;

use exit_codes::KilnExitCode;

/// Kiln build orchestrator for multi-version Solidity projects.
///
/// Kiln resolves a compiler profile for every source file, compiles files
/// sharing a profile together, checks bytecode sizes against the selected
/// network and writes artifacts into a per-tool cache.
///
/// EXAMPLES:
///     kiln build                       Build for the default network
///     kiln build --network mainnet     Enforce mainnet size limits
///     kiln build --json                Print the build report as JSON
///     kiln plan                        Show the resolved profile per file
///
/// ENVIRONMENT VARIABLES:
///     KILN_NETWORK      Network profile used when --network is not given
///     KILN_JSON         Set to 'true' for JSON output by default
///     KILN_LOG          Log level (error, warn, info, debug, trace)
///     NO_COLOR          Set to disable colored output
///
/// EXIT CODES:
///     0    build succeeded
///     96   configuration rejected
///     100  one or more compile batches failed
///     101  run aborted
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project
    ///
    /// Resolves a profile for every source, compiles one batch per profile
    /// in parallel, validates sizes for the selected network and writes
    /// artifacts into the cache.
    ///
    /// EXAMPLES:
    ///     kiln build                        Build with kiln.toml defaults
    ///     kiln build --network hardhat      Validate for hardhat
    ///     kiln build --jobs 1               Compile batches one at a time
    #[command(visible_alias = "b")]
    Build {
        /// Network profile to validate against
        #[arg(long, short = 'n', env = "KILN_NETWORK")]
        network: Option<String>,
        /// Sources directory, relative to the project root
        #[arg(long, short = 's')]
        sources: Option<PathBuf>,
        /// Path to kiln.toml (searched upwards by default)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Number of batches compiled in parallel
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// JSON output
        #[arg(long, env = "KILN_JSON")]
        json: bool,
    },

    /// Show the resolved build plan without compiling
    ///
    /// EXAMPLES:
    ///     kiln plan                Table of file, profile hash and profile
    ///     kiln plan --json         Plan as JSON
    #[command(visible_alias = "p")]
    Plan {
        /// Sources directory, relative to the project root
        #[arg(long, short = 's')]
        sources: Option<PathBuf>,
        /// Path to kiln.toml (searched upwards by default)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// JSON output
        #[arg(long, env = "KILN_JSON")]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    output::init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Build {
            network,
            sources,
            config,
            jobs,
            json,
        } => commands::build::run(commands::build::BuildArgs {
            network,
            sources,
            config,
            jobs,
            json,
            quiet: cli.quiet,
            project_dir: None,
        }),
        Commands::Plan {
            sources,
            config,
            json,
        } => commands::plan::run(commands::plan::PlanArgs {
            sources,
            config,
            json,
            project_dir: None,
        }),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            KilnExitCode::for_error(&e)
        }
    };
    tracing::debug!(code, "exiting");
    std::process::exit(code);
}
