//! Process exit codes. Part of the CLI contract; scripts branch on them.

use flakefinder_core::FinderError;

pub use flakefinder_core::error::{
    EXIT_CONFIG_ERROR, EXIT_IO_ERROR, EXIT_PROTOCOL_ERROR, EXIT_UPSTREAM_UNAVAILABLE,
};

pub const EXIT_SUCCESS: i32 = 0;
/// Rejected command line. Emitted by clap before any command runs.
pub const EXIT_USAGE_ERROR: i32 = 2;
/// Failure outside the pipeline's error taxonomy.
pub const EXIT_INTERNAL_ERROR: i32 = 6;

/// Exit code for an error returned by a command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FinderError>() {
        Some(e) => e.exit_code(),
        None => EXIT_INTERNAL_ERROR,
    }
}
