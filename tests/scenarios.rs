//! End-to-end scenarios against a real interpreter.
//!
//! Each test builds its own runner over a throwaway scratch directory and
//! skips cleanly when no `python3` is installed on the host.

#![cfg(unix)]

use anyhow::Result;
use pyrunner::{ExecutionRequest, ExecutionStatus, PyRunner, RunnerConfig};
use std::sync::Once;
use tempfile::TempDir;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A runner writing scratch files into `dir`, or `None` when the host has
/// no Python interpreter to test against.
fn sandbox(dir: &TempDir) -> Option<PyRunner> {
    init_tracing();
    match RunnerConfig::new() {
        Ok(config) => Some(PyRunner::with_config(
            config.with_scratch_dir(dir.path().to_path_buf()),
        )),
        Err(_) => {
            eprintln!("skipping: no python interpreter on PATH");
            None
        }
    }
}

fn scratch_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path())
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[tokio::test]
async fn hello_world_succeeds() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new(r#"print("Hello, PyRunner!")"#);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.stdout.trim(), "Hello, PyRunner!");
    assert!(outcome.error_summary.is_none());
    assert!(outcome.execution_time_seconds <= request.timeout_seconds() as f64);
    assert!(scratch_is_empty(&dir), "scratch file must be gone");
    Ok(())
}

#[tokio::test]
async fn permitted_import_runs() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new("import math\nprint(math.sqrt(16))")
        .with_timeout_seconds(10)
        .with_memory_limit_mib(256);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.stdout.trim(), "4.0");
    Ok(())
}

#[tokio::test]
async fn infinite_loop_times_out() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new("while True: pass")
        .with_timeout_seconds(2)
        .with_memory_limit_mib(256);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Timeout);
    assert!(outcome.stdout.is_empty());
    assert!(
        outcome.stderr.contains("timed out"),
        "stderr should carry the timeout notice: {}",
        outcome.stderr
    );
    assert!(
        outcome.execution_time_seconds >= 2.0 && outcome.execution_time_seconds < 4.0,
        "wall clock should sit near the deadline, was {}",
        outcome.execution_time_seconds
    );
    assert!(scratch_is_empty(&dir));
    Ok(())
}

#[tokio::test]
async fn output_before_the_deadline_is_preserved() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let code = "print(\"before the loop\", flush=True)\nwhile True: pass";
    let request = ExecutionRequest::new(code).with_timeout_seconds(2);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Timeout);
    assert!(outcome.stdout.contains("before the loop"));
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn oversized_allocation_exceeds_memory() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new("x = bytearray(600_000_000)\nprint(len(x))")
        .with_timeout_seconds(30)
        .with_memory_limit_mib(128);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::MemoryExceeded);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.error_summary.unwrap().contains("memory limit"));
    assert!(scratch_is_empty(&dir));
    Ok(())
}

#[tokio::test]
async fn runtime_error_surfaces_the_diagnostic() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new("print(1/0)").with_timeout_seconds(10);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Error);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.stderr.contains("ZeroDivisionError"));
    assert!(outcome
        .error_summary
        .unwrap()
        .contains("ZeroDivisionError"));
    Ok(())
}

#[tokio::test]
async fn stdlib_modules_run_in_isolated_mode() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let code = "import statistics\nprint(statistics.mean([1, 2, 3]))";
    let outcome = runner.execute(&ExecutionRequest::new(code)).await;
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.stdout.trim(), "2");
    Ok(())
}

#[tokio::test]
async fn captured_output_is_capped_without_stalling() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };
    let runner = PyRunner::with_config(
        runner
            .config()
            .clone()
            .with_max_output_bytes(1000),
    );

    // Far more output than the cap and than a pipe buffer holds.
    let request = ExecutionRequest::new("print(\"a\" * 1_000_000)").with_timeout_seconds(30);
    let outcome = runner.execute(&request).await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.stdout.len(), 1000);
    Ok(())
}

#[tokio::test]
async fn identical_requests_are_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let request = ExecutionRequest::new("print(sum(range(100)))");
    let first = runner.execute(&request).await;
    let second = runner.execute(&request).await;

    assert_eq!(first.status, ExecutionStatus::Success);
    assert_eq!(first.status, second.status);
    assert_eq!(first.stdout.trim_end(), second.stdout.trim_end());
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_do_not_interfere() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let first = ExecutionRequest::new("print('alpha')");
    let second = ExecutionRequest::new("print('beta')");
    let third = ExecutionRequest::new("print('gamma')");
    let (a, b, c) = tokio::join!(
        runner.execute(&first),
        runner.execute(&second),
        runner.execute(&third),
    );

    assert_eq!(a.status, ExecutionStatus::Success);
    assert_eq!(b.status, ExecutionStatus::Success);
    assert_eq!(c.status, ExecutionStatus::Success);
    assert_eq!(a.stdout.trim(), "alpha");
    assert_eq!(b.stdout.trim(), "beta");
    assert_eq!(c.stdout.trim(), "gamma");
    assert!(scratch_is_empty(&dir));
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_an_error_outcome() -> Result<()> {
    // No interpreter needed: the path is deliberately bogus.
    let dir = TempDir::new()?;
    let config = RunnerConfig::with_python_path("/nonexistent/python-binary".into())
        .with_scratch_dir(dir.path().to_path_buf());
    let runner = PyRunner::with_config(config);

    let outcome = runner.execute(&ExecutionRequest::new("print(1)")).await;

    assert_eq!(outcome.status, ExecutionStatus::Error);
    assert!(outcome
        .error_summary
        .unwrap()
        .contains("failed to start interpreter"));
    assert!(scratch_is_empty(&dir), "scratch must be released on spawn failure");
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn long_run_reports_peak_memory() -> Result<()> {
    let dir = TempDir::new()?;
    let Some(runner) = sandbox(&dir) else {
        return Ok(());
    };

    let code = "import time\ntime.sleep(1)\nprint('done')";
    let outcome = runner
        .execute(&ExecutionRequest::new(code).with_timeout_seconds(10))
        .await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    let peak = outcome.peak_memory_mib.expect("sampler ran at least once");
    assert!(peak > 0.0);
    Ok(())
}
