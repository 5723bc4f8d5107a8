//! Log setup

use tracing::level_filters::LevelFilter;

/// Environment variable overriding the log level
pub const LOG_ENV: &str = "KILN_LOG";

/// Log level for the `-v`/`-q` flags
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the stderr subscriber
///
/// `KILN_LOG` (e.g. `debug`) wins over the flags when it parses.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or_else(|| level_for(verbose, quiet));

    // A second init (as in tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .try_init();
}
