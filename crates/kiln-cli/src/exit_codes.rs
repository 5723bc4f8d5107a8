//! Process exit codes

use kiln_build::{BuildError, RunStatus};
use kiln_config::ConfigError;

/// Documented exit codes for `kiln`
///
/// Unknown or unexpected failures always exit with 1.
pub enum KilnExitCode {}

impl KilnExitCode {
    /// The build finished and every batch compiled.
    pub const OK: i32 = 0;

    /// Something went wrong that kiln does not classify.
    pub const UNEXPECTED: i32 = 1;

    /// The configuration was rejected before any work started.
    pub const CONFIG_ERROR: i32 = 96;

    /// One or more compile batches failed.
    pub const PARTIAL_FAILURE: i32 = 100;

    /// The run was aborted (preprocess, size limit, artifact writes, lock,
    /// cancellation).
    pub const FATAL: i32 = 101;

    /// Exit code for a finished run
    pub fn for_status(status: RunStatus) -> i32 {
        match status {
            RunStatus::Success => Self::OK,
            RunStatus::PartialFailure => Self::PARTIAL_FAILURE,
        }
    }

    /// Exit code for an error that ended the command
    pub fn for_error(error: &anyhow::Error) -> i32 {
        if let Some(build) = error.downcast_ref::<BuildError>() {
            if build.is_config_error() {
                Self::CONFIG_ERROR
            } else {
                Self::FATAL
            }
        } else if error.downcast_ref::<ConfigError>().is_some() {
            Self::CONFIG_ERROR
        } else {
            Self::UNEXPECTED
        }
    }
}
