//! Resource-limited interpreter spawning.
//!
//! The child is placed in a fresh process group with OS caps installed
//! between fork and exec, so the supervisor can signal the whole group and
//! the kernel bounds what the group can consume. A child that cannot be
//! fully limited must not run at all: every `setrlimit` failure aborts the
//! spawn, and on platforms without these primitives `spawn` refuses
//! outright instead of weakening isolation.

use crate::config::HARD_CPU_CEILING_SECONDS;
use crate::errors::{Result, RunnerError};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::{Child, Command};
use tracing::debug;

/// Thread cap handed to the scientific libraries via their well-known
/// environment variables.
const SCIENTIFIC_THREAD_CAP: u32 = 4;

/// OS caps for one child.
#[derive(Debug, Clone, Copy)]
pub struct SpawnLimits {
    /// Address-space cap in MiB.
    pub memory_mib: u64,
    /// CPU-time cap in seconds; clamped to [`HARD_CPU_CEILING_SECONDS`].
    pub cpu_seconds: u64,
    /// Open-file-descriptor cap.
    pub open_files: u64,
}

/// A freshly spawned interpreter: the handle, its process-group id, and
/// the moment it started.
pub struct SpawnedChild {
    pub child: Child,
    pub pid: u32,
    pub pgid: i32,
    pub started: Instant,
}

/// Spawn `python script` under `limits`, streams piped, stdin closed.
///
/// The interpreter runs in isolated mode (`-I`) with a scrubbed
/// environment, so user-site configuration and parent environment
/// variables never reach user code.
#[cfg(unix)]
pub fn spawn(python: &Path, script: &Path, limits: &SpawnLimits) -> Result<SpawnedChild> {
    let mut cmd = Command::new(python);
    cmd.arg("-I")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_clear()
        .env("PYTHONIOENCODING", "utf-8")
        .env("OMP_NUM_THREADS", SCIENTIFIC_THREAD_CAP.to_string())
        .env("OPENBLAS_NUM_THREADS", SCIENTIFIC_THREAD_CAP.to_string())
        .env("MKL_NUM_THREADS", SCIENTIFIC_THREAD_CAP.to_string())
        .kill_on_drop(true);

    #[cfg(not(target_os = "macos"))]
    let memory_bytes = limits.memory_mib.saturating_mul(1024 * 1024);
    let cpu_seconds = limits.cpu_seconds.min(HARD_CPU_CEILING_SECONDS);
    let open_files = limits.open_files;

    unsafe {
        cmd.pre_exec(move || {
            // New process group, so the whole subtree can be signalled as
            // one unit.
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // Address-space cap. macOS does not honor RLIMIT_AS; there the
            // supervisor's sampler is the memory enforcement.
            #[cfg(not(target_os = "macos"))]
            {
                let rlimit = libc::rlimit {
                    rlim_cur: memory_bytes as libc::rlim_t,
                    rlim_max: memory_bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &rlimit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }

            let rlimit = libc::rlimit {
                rlim_cur: cpu_seconds as libc::rlim_t,
                rlim_max: cpu_seconds as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_CPU, &rlimit) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            let rlimit = libc::rlimit {
                rlim_cur: open_files as libc::rlim_t,
                rlim_max: open_files as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_NOFILE, &rlimit) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // No core dumps on crash.
            let rlimit = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if libc::setrlimit(libc::RLIMIT_CORE, &rlimit) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            Ok(())
        });
    }

    let started = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| RunnerError::SpawnFailed(e.to_string()))?;
    let pid = child
        .id()
        .ok_or_else(|| RunnerError::SpawnFailed("child exited before it was tracked".into()))?;

    debug!("[SPAWNER] started interpreter pid={pid} mem={}MiB", limits.memory_mib);

    Ok(SpawnedChild {
        child,
        pid,
        // setpgid(0, 0) makes the child the leader of a group named after
        // its own pid.
        pgid: pid as i32,
        started,
    })
}

/// Hosts without POSIX resource primitives refuse to run user code.
#[cfg(not(unix))]
pub fn spawn(_python: &Path, _script: &Path, _limits: &SpawnLimits) -> Result<SpawnedChild> {
    Err(RunnerError::SpawnFailed(
        "OS-level resource caps are unavailable on this platform".to_string(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn limits() -> SpawnLimits {
        SpawnLimits {
            memory_mib: 256,
            cpu_seconds: 10,
            open_files: 50,
        }
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_spawn_failure() {
        let result = spawn(
            &PathBuf::from("/nonexistent/python-binary"),
            &PathBuf::from("/tmp/unused.py"),
            &limits(),
        );
        assert!(matches!(result, Err(RunnerError::SpawnFailed(_))));
    }
}
