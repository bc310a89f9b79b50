use thiserror::Error;

/// Everything that can go wrong between accepting a request and returning
/// an outcome. The outcome status is derived from this taxonomy; callers of
/// [`crate::PyRunner::execute`] only ever see the derived
/// [`crate::ExecutionStatus`], never the enum itself.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("validation rejected: {0}")]
    ValidationRejected(String),
    #[error("failed to start interpreter: {0}")]
    SpawnFailed(String),
    #[error("interpreter exited (code {exit_code}): {detail}")]
    ChildRuntimeError { exit_code: i32, detail: String },
    #[error("execution timed out after {limit_seconds} seconds")]
    Timeout { limit_seconds: u64 },
    #[error("memory limit of {limit_mib} MiB exceeded")]
    MemoryExceeded { limit_mib: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RunnerError {
    fn from(e: std::io::Error) -> Self {
        RunnerError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
