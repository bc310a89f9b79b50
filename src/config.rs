//! Service-level configuration: interpreter path, scratch directory, and
//! the fixed caps that are not part of a request.

use crate::errors::{Result, RunnerError};
use std::path::PathBuf;

/// CPU-time rlimit handed to every child, independent of the per-request
/// wall-clock timeout. Bounds CPU-bound runaways even if wall-clock
/// enforcement fails.
pub const HARD_CPU_CEILING_SECONDS: u64 = 300;

/// Default cap on open file descriptors in the child.
pub const DEFAULT_MAX_OPEN_FILES: u64 = 50;

/// Default per-stream capture cap. Bytes beyond it are drained and
/// discarded so the child never stalls on a full pipe.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Static configuration supplied at service startup.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the Python interpreter.
    pub python_path: PathBuf,
    /// Directory that receives per-request scratch files.
    pub scratch_dir: PathBuf,
    /// Per-stream capture cap in bytes.
    pub max_output_bytes: usize,
    /// Open-file-descriptor cap for the child.
    pub max_open_files: u64,
}

impl RunnerConfig {
    /// Resolve an interpreter from `PATH` and default everything else.
    pub fn new() -> Result<Self> {
        let python_path = which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| {
                RunnerError::SpawnFailed("no python3 or python interpreter on PATH".to_string())
            })?;
        Ok(Self::with_python_path(python_path))
    }

    /// Use an explicit interpreter (for bundled or pinned Pythons).
    pub fn with_python_path(python_path: PathBuf) -> Self {
        Self {
            python_path,
            scratch_dir: std::env::temp_dir(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// The interpreter must exist and the scratch directory must be
    /// writable before any request is served.
    pub fn check(&self) -> Result<()> {
        if !self.python_path.exists() {
            return Err(RunnerError::SpawnFailed(format!(
                "interpreter not found at {}",
                self.python_path.display()
            )));
        }
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| {
            RunnerError::SpawnFailed(format!(
                "scratch directory {} is not usable: {e}",
                self.scratch_dir.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_keeps_defaults() {
        let config = RunnerConfig::with_python_path(PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.max_open_files, DEFAULT_MAX_OPEN_FILES);
        assert_eq!(config.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
        assert_eq!(config.scratch_dir, std::env::temp_dir());
    }

    #[test]
    fn check_rejects_missing_interpreter() {
        let config =
            RunnerConfig::with_python_path(PathBuf::from("/nonexistent/python-binary"));
        assert!(config.check().is_err());
    }

    #[test]
    fn builders_override_defaults() {
        let config = RunnerConfig::with_python_path(PathBuf::from("/usr/bin/python3"))
            .with_scratch_dir(PathBuf::from("/tmp/pyrunner-test"))
            .with_max_output_bytes(4096);
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/pyrunner-test"));
        assert_eq!(config.max_output_bytes, 4096);
    }
}
