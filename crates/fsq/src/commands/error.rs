//! Error types for command execution and their exit codes

use fsq_core::config::{ConfigError, ExitCodes};
use fsq_core::FsqError;
use thiserror::Error;

/// Command execution errors
#[derive(Debug, Error)]
pub enum CommandError {
    /// The worker program could not be started
    #[error("cannot exec {prog}: {source}")]
    Spawn {
        prog: String,
        source: std::io::Error,
    },

    /// The worker program died from a signal; the scan was aborted
    #[error("worker for {id} killed by signal {signal}; aborting")]
    Signaled { id: String, signal: i32 },
}

/// True for failures that retrying the same command cannot fix
fn is_permanent(err: &FsqError) -> bool {
    match err {
        FsqError::Path { .. }
        | FsqError::Encode { .. }
        | FsqError::Coerce { .. }
        | FsqError::TimeFmt { .. }
        | FsqError::MalformedEntry { .. }
        | FsqError::QueueExists { .. }
        | FsqError::TtlExpired { .. }
        | FsqError::MaxTries { .. } => true,
        FsqError::Reenqueue { source, .. } => is_permanent(source),
        _ => false,
    }
}

/// Map a command failure to the process exit code
///
/// Usage, naming and configuration problems exit with the permanent
/// failure code; I/O and contention problems with the temporary one.
pub fn exit_code(err: &anyhow::Error, codes: ExitCodes) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<FsqError>() {
            return if is_permanent(e) {
                codes.fail_perm
            } else {
                codes.fail_tmp
            };
        }
        if cause.is::<ConfigError>() {
            return codes.fail_perm;
        }
        if cause.is::<CommandError>() {
            return codes.fail_tmp;
        }
    }
    codes.fail_tmp
}
