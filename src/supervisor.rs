//! Execution supervisor: one call, one child, one classified outcome.
//!
//! For each request the supervisor writes the code to a uniquely named
//! scratch file, spawns the interpreter through the resource-limited
//! spawner, and then cooperatively interleaves three activities until the
//! child is gone: draining both output pipes, sampling the child's
//! resident-set size every 100 ms, and watching the wall-clock deadline.
//! Whichever enforcer fires first owns the classification; the scratch
//! file is removed on every exit path, including panics and a caller
//! dropping the future mid-run.

use crate::config::{RunnerConfig, HARD_CPU_CEILING_SECONDS};
use crate::errors::{Result, RunnerError};
use crate::memory;
use crate::spawner::{self, SpawnLimits};
use crate::types::{ExecutionOutcome, ExecutionRequest, ExecutionStatus};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Interval between resident-set-size samples.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// How long a signalled process group gets to exit before SIGKILL.
const TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// Run one request to completion. Hard failures (scratch I/O, spawn
/// refusal, supervisor defects) are folded into an `Error` outcome here so
/// callers always receive a classification.
pub async fn run(config: &RunnerConfig, request: &ExecutionRequest) -> ExecutionOutcome {
    let started = Instant::now();
    match run_supervised(config, request, started).await {
        Ok(outcome) => outcome,
        Err(error) => ExecutionOutcome::failure(&error, started.elapsed().as_secs_f64()),
    }
}

async fn run_supervised(
    config: &RunnerConfig,
    request: &ExecutionRequest,
    started: Instant,
) -> Result<ExecutionOutcome> {
    let scratch = ScratchFile::create(&config.scratch_dir, request.code())?;

    let limits = SpawnLimits {
        memory_mib: request.memory_limit_mib(),
        // The per-request budget is wall clock; the CPU rlimit stays at the
        // fixed ceiling as a backstop for CPU-bound runaways.
        cpu_seconds: HARD_CPU_CEILING_SECONDS,
        open_files: config.max_open_files,
    };
    let spawner::SpawnedChild {
        mut child,
        pid,
        pgid,
        started: child_started,
    } = spawner::spawn(&config.python_path, scratch.path(), &limits)?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| RunnerError::Internal("child stdout was not piped".to_string()))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| RunnerError::Internal("child stderr was not piped".to_string()))?;
    let stdout_task = tokio::spawn(drain_stream(stdout_pipe, config.max_output_bytes));
    let stderr_task = tokio::spawn(drain_stream(stderr_pipe, config.max_output_bytes));

    let memory_cap_bytes = request.memory_limit_mib() * 1024 * 1024;
    let deadline = tokio::time::Instant::from_std(
        started + Duration::from_secs(request.timeout_seconds()),
    );
    let mut sampler = tokio::time::interval(SAMPLE_INTERVAL);
    sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut peak_rss: Option<u64> = None;
    let mut firings = Firings::default();
    let mut kill_at: Option<tokio::time::Instant> = None;

    let exit_status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|e| RunnerError::Internal(e.to_string()))?;
            }
            _ = sampler.tick() => {
                if let Some(rss) = memory::resident_set_size(pid) {
                    peak_rss = Some(peak_rss.map_or(rss, |peak| peak.max(rss)));
                    if rss > memory_cap_bytes && firings.memory.is_none() {
                        firings.memory = Some(Instant::now());
                        warn!(
                            "[SUPERVISOR] rss {} bytes over {} MiB cap, terminating group {}",
                            rss,
                            request.memory_limit_mib(),
                            pgid
                        );
                        signal_group(pgid, GroupSignal::Term);
                        kill_at.get_or_insert(tokio::time::Instant::now() + TERMINATION_GRACE);
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline), if firings.timeout.is_none() => {
                firings.timeout = Some(Instant::now());
                warn!(
                    "[SUPERVISOR] wall clock reached {}s, terminating group {}",
                    request.timeout_seconds(),
                    pgid
                );
                signal_group(pgid, GroupSignal::Term);
                kill_at.get_or_insert(tokio::time::Instant::now() + TERMINATION_GRACE);
            }
            _ = tokio::time::sleep_until(kill_at.unwrap_or_else(tokio::time::Instant::now)),
                if kill_at.is_some() =>
            {
                warn!("[SUPERVISOR] group {pgid} survived SIGTERM, killing");
                signal_group(pgid, GroupSignal::Kill);
                kill_at = None;
            }
        }
    };

    // Sweep any grandchildren still holding the group (and the pipes) open.
    signal_group(pgid, GroupSignal::Kill);

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    let execution_time_seconds = started.elapsed().as_secs_f64();
    let peak_memory_mib = peak_rss.map(|bytes| bytes as f64 / (1024.0 * 1024.0));
    debug!(
        "[SUPERVISOR] child ran {:.3}s, exit {:?}, peak {:?} MiB",
        child_started.elapsed().as_secs_f64(),
        exit_status.code(),
        peak_memory_mib
    );

    let (status, error_summary) = match firings.winner() {
        Some(Enforcement::Timeout) => {
            let error = RunnerError::Timeout {
                limit_seconds: request.timeout_seconds(),
            };
            append_notice(&mut stderr, &error.to_string());
            (ExecutionStatus::Timeout, Some(error.to_string()))
        }
        Some(Enforcement::Memory) => {
            let error = RunnerError::MemoryExceeded {
                limit_mib: request.memory_limit_mib(),
            };
            append_notice(&mut stderr, &error.to_string());
            (ExecutionStatus::MemoryExceeded, Some(error.to_string()))
        }
        None if exit_status.success() => (ExecutionStatus::Success, None),
        None => {
            if child_died_of_memory(&exit_status, &stderr) {
                let error = RunnerError::MemoryExceeded {
                    limit_mib: request.memory_limit_mib(),
                };
                append_notice(&mut stderr, &error.to_string());
                (ExecutionStatus::MemoryExceeded, Some(error.to_string()))
            } else {
                (ExecutionStatus::Error, Some(child_error_summary(&exit_status, &stderr)))
            }
        }
    };

    Ok(ExecutionOutcome {
        status,
        stdout,
        stderr,
        execution_time_seconds,
        peak_memory_mib,
        error_summary,
    })
}

/// A uniquely named scratch file holding one request's code. Mode 0600 so
/// other tenants of the scratch directory cannot read it; removed by the
/// drop guard on every exit path.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn create(dir: &Path, code: &str) -> Result<Self> {
        use std::io::Write;

        let path = dir.join(format!("pyrunner-{}.py", Uuid::new_v4()));
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&path)
            .map_err(|e| RunnerError::Internal(format!("failed to create scratch file: {e}")))?;
        let guard = Self { path };
        file.write_all(code.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| RunnerError::Internal(format!("failed to write scratch file: {e}")))?;
        Ok(guard)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("[SUPERVISOR] failed to remove scratch file {}: {e}", self.path.display());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enforcement {
    Timeout,
    Memory,
}

/// Enforcement firings with their timestamps. Both enforcers may fire
/// before the child is finally gone; the earlier firing owns the
/// classification.
#[derive(Debug, Default)]
struct Firings {
    timeout: Option<Instant>,
    memory: Option<Instant>,
}

impl Firings {
    fn winner(&self) -> Option<Enforcement> {
        match (self.timeout, self.memory) {
            (Some(t), Some(m)) if t <= m => Some(Enforcement::Timeout),
            (Some(_), Some(_)) => Some(Enforcement::Memory),
            (Some(_), None) => Some(Enforcement::Timeout),
            (None, Some(_)) => Some(Enforcement::Memory),
            (None, None) => None,
        }
    }
}

enum GroupSignal {
    Term,
    Kill,
}

/// Signal the whole process group; a group that is already gone is fine.
#[cfg(unix)]
fn signal_group(pgid: i32, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
        if e != nix::errno::Errno::ESRCH {
            warn!("[SUPERVISOR] killpg({pgid}, {signal}) failed: {e}");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: i32, _signal: GroupSignal) {}

/// Read a pipe to EOF, capturing at most `cap` bytes. Reading continues
/// past the cap so the child never blocks on a full pipe; the excess is
/// discarded.
async fn drain_stream<R>(mut stream: R, cap: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let take = n.min(cap - captured.len());
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    captured
}

/// A non-zero exit caused by the address-space cap rather than by the
/// code itself: CPython reports the failed allocation as MemoryError; a
/// kernel out-of-memory kill arrives as SIGKILL.
fn child_died_of_memory(exit_status: &std::process::ExitStatus, stderr: &str) -> bool {
    if stderr.contains("MemoryError") {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if exit_status.signal() == Some(libc::SIGKILL) {
            return true;
        }
    }
    #[cfg(not(unix))]
    let _ = exit_status;
    false
}

/// Short diagnostic for a child that failed on its own. The detail is the
/// last non-empty stderr line (CPython puts `SomeError: detail` there); a
/// signal death has no exit code and is reported as -1.
fn child_error_summary(exit_status: &std::process::ExitStatus, stderr: &str) -> String {
    let detail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string();
    RunnerError::ChildRuntimeError {
        exit_code: exit_status.code().unwrap_or(-1),
        detail,
    }
    .to_string()
}

fn append_notice(stderr: &mut String, notice: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str("pyrunner: ");
    stderr.push_str(notice);
    stderr.push('\n');
}
