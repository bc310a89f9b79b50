//! Public data types: the request, the outcome, and the service descriptor.

use crate::errors::RunnerError;
use serde::{Deserialize, Serialize};

/// Inclusive bounds on a request's wall-clock budget, in seconds.
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Inclusive bounds on a request's memory cap, in MiB.
pub const MIN_MEMORY_LIMIT_MIB: u64 = 64;
pub const MAX_MEMORY_LIMIT_MIB: u64 = 2048;
pub const DEFAULT_MEMORY_LIMIT_MIB: u64 = 512;

/// Largest accepted source, in bytes.
pub const MAX_CODE_BYTES: usize = 1024 * 1024;

/// One unit of work: a source string plus its per-request limits.
/// Immutable after construction; bounds are checked before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    code: String,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_memory_limit")]
    memory_limit_mib: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_memory_limit() -> u64 {
    DEFAULT_MEMORY_LIMIT_MIB
}

impl ExecutionRequest {
    /// Build a request with the default limits.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            memory_limit_mib: DEFAULT_MEMORY_LIMIT_MIB,
        }
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_memory_limit_mib(mut self, memory_limit_mib: u64) -> Self {
        self.memory_limit_mib = memory_limit_mib;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn memory_limit_mib(&self) -> u64 {
        self.memory_limit_mib
    }

    /// Reject out-of-range requests before any execution. All bounds are
    /// inclusive; an empty or whitespace-only source is invalid.
    pub fn check_bounds(&self) -> Result<(), RunnerError> {
        if self.code.trim().is_empty() {
            return Err(RunnerError::ValidationRejected(
                "code must not be empty".to_string(),
            ));
        }
        if self.code.len() > MAX_CODE_BYTES {
            return Err(RunnerError::ValidationRejected(format!(
                "code exceeds the maximum size of {MAX_CODE_BYTES} bytes"
            )));
        }
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            return Err(RunnerError::ValidationRejected(format!(
                "timeout must be between {MIN_TIMEOUT_SECONDS} and {MAX_TIMEOUT_SECONDS} seconds"
            )));
        }
        if !(MIN_MEMORY_LIMIT_MIB..=MAX_MEMORY_LIMIT_MIB).contains(&self.memory_limit_mib) {
            return Err(RunnerError::ValidationRejected(format!(
                "memory limit must be between {MIN_MEMORY_LIMIT_MIB} and {MAX_MEMORY_LIMIT_MIB} MiB"
            )));
        }
        Ok(())
    }
}

/// Four-way outcome classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    MemoryExceeded,
}

impl From<&RunnerError> for ExecutionStatus {
    fn from(error: &RunnerError) -> Self {
        match error {
            RunnerError::Timeout { .. } => ExecutionStatus::Timeout,
            RunnerError::MemoryExceeded { .. } => ExecutionStatus::MemoryExceeded,
            RunnerError::ValidationRejected(_)
            | RunnerError::SpawnFailed(_)
            | RunnerError::ChildRuntimeError { .. }
            | RunnerError::Internal(_) => ExecutionStatus::Error,
        }
    }
}

/// The result of one run: captured streams, wall-clock duration, peak
/// resident memory when sampled, and a short error summary when the status
/// is not [`ExecutionStatus::Success`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_seconds: f64,
    pub peak_memory_mib: Option<f64>,
    pub error_summary: Option<String>,
}

impl ExecutionOutcome {
    /// An outcome for work that never reached the interpreter: rejected
    /// requests, spawn failures, internal defects.
    pub(crate) fn failure(error: &RunnerError, execution_time_seconds: f64) -> Self {
        Self {
            status: ExecutionStatus::from(error),
            stdout: String::new(),
            stderr: String::new(),
            execution_time_seconds,
            peak_memory_mib: None,
            error_summary: Some(error.to_string()),
        }
    }
}

/// Health-probe descriptor: who this service is and what it supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub max_timeout_seconds: u64,
    pub max_memory_limit_mib: u64,
    pub permitted_imports: Vec<String>,
}
