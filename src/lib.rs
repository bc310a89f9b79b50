//! Sandboxed Python execution for untrusted snippets.
//!
//! Two layers of defense: a static validator parses submissions to an AST
//! and rejects forbidden imports, builtins, and attribute accesses before
//! anything runs; a subprocess supervisor then executes admitted code under
//! OS resource caps in a fresh process group, samples its resident memory,
//! enforces a wall-clock deadline, and classifies the result as one of
//! `success`, `error`, `timeout`, or `memory_exceeded`.
//!
//! # Example
//!
//! ```no_run
//! use pyrunner::{ExecutionRequest, ExecutionStatus, PyRunner};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), pyrunner::RunnerError> {
//! let runner = PyRunner::new()?;
//! let request = ExecutionRequest::new("print(\"Hello, PyRunner!\")")
//!     .with_timeout_seconds(10)
//!     .with_memory_limit_mib(256);
//!
//! let outcome = runner.execute(&request).await;
//! assert_eq!(outcome.status, ExecutionStatus::Success);
//! assert_eq!(outcome.stdout.trim(), "Hello, PyRunner!");
//! # Ok(())
//! # }
//! ```

mod analyzer;
mod config;
mod errors;
mod memory;
mod policy;
mod runner;
mod spawner;
mod supervisor;
mod types;

pub use analyzer::validate_source;
pub use config::{
    RunnerConfig, DEFAULT_MAX_OPEN_FILES, DEFAULT_MAX_OUTPUT_BYTES, HARD_CPU_CEILING_SECONDS,
};
pub use errors::RunnerError;
pub use policy::PolicyCatalog;
pub use runner::PyRunner;
pub use types::{
    ExecutionOutcome, ExecutionRequest, ExecutionStatus, ServiceInfo, DEFAULT_MEMORY_LIMIT_MIB,
    DEFAULT_TIMEOUT_SECONDS, MAX_CODE_BYTES, MAX_MEMORY_LIMIT_MIB, MAX_TIMEOUT_SECONDS,
    MIN_MEMORY_LIMIT_MIB, MIN_TIMEOUT_SECONDS,
};
