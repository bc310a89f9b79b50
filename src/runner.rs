//! The service facade: admission control in front of the supervisor.

use crate::analyzer;
use crate::config::RunnerConfig;
use crate::errors::{Result, RunnerError};
use crate::policy::PolicyCatalog;
use crate::supervisor;
use crate::types::{
    ExecutionOutcome, ExecutionRequest, ServiceInfo, MAX_MEMORY_LIMIT_MIB, MAX_TIMEOUT_SECONDS,
};
use std::time::Instant;
use tracing::info;

/// Sandboxed Python execution service.
///
/// One `PyRunner` serves any number of concurrent [`execute`] calls; each
/// call owns its scratch file and child process and shares nothing with
/// its neighbours.
///
/// [`execute`]: PyRunner::execute
pub struct PyRunner {
    config: RunnerConfig,
    catalog: PolicyCatalog,
}

impl PyRunner {
    /// Discover an interpreter on `PATH` and use the default catalog and
    /// scratch directory.
    pub fn new() -> Result<Self> {
        let config = RunnerConfig::new()?;
        config.check()?;
        info!(
            "[RUNNER] using interpreter {}",
            config.python_path.display()
        );
        Ok(Self::with_config(config))
    }

    /// Build from explicit configuration. The configuration is checked on
    /// first use rather than here; see [`RunnerConfig::check`].
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            catalog: PolicyCatalog::new(),
        }
    }

    /// Replace the admission catalog.
    pub fn with_catalog(mut self, catalog: PolicyCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Run one request: bounds check, static validation, then supervised
    /// execution. Every failure mode comes back as a classified
    /// [`ExecutionOutcome`]; rejected requests never reach the
    /// interpreter and report a near-zero execution time.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let started = Instant::now();

        if let Err(error) = request.check_bounds() {
            return ExecutionOutcome::failure(&error, started.elapsed().as_secs_f64());
        }
        if let Err(reason) = analyzer::validate_source(request.code(), &self.catalog) {
            info!("[RUNNER] rejected submission: {reason}");
            let error = RunnerError::ValidationRejected(reason);
            return ExecutionOutcome::failure(&error, started.elapsed().as_secs_f64());
        }

        supervisor::run(&self.config, request).await
    }

    /// Health-probe descriptor: service identity and supported limits.
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "pyrunner".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            max_memory_limit_mib: MAX_MEMORY_LIMIT_MIB,
            permitted_imports: self.catalog.permitted_imports(),
        }
    }
}
