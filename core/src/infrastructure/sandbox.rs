// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Process Sandbox
//!
//! Default [`SandboxExecutor`]: runs `code + test_case` through the
//! configured interpreter in a resource-capped child process. Isolation
//! measures per run:
//!
//! - fresh scratch directory as working directory, removed afterwards
//! - cleared environment (only a minimal `PATH` is passed through)
//! - `RLIMIT_CPU` and `RLIMIT_AS` applied in the child pre-exec
//! - wall-clock deadline enforced by the parent; the child is killed on
//!   breach
//! - concurrency bounded by a FIFO semaphore; waiting submissions beyond
//!   the queue depth fail fast as overloaded
//!
//! Peak memory and CPU time are sampled from `/proc/<pid>` while the child
//! runs. Container or microVM isolation can replace this behind the same
//! trait without touching the Gauntlet.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::sandbox::{SandboxError, SandboxExecutor, SandboxLimits};
use crate::domain::verdict::ExecutionReport;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
const SIGKILL_EXIT: i32 = 128 + 9;

pub struct ProcessSandbox {
    interpreter: String,
    permits: Arc<Semaphore>,
    admitted: AtomicUsize,
    max_admitted: usize,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<String>, max_concurrency: usize, max_queue_depth: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            admitted: AtomicUsize::new(0),
            // Running plus queued; beyond this, fail fast.
            max_admitted: max_concurrency.max(1) + max_queue_depth,
        }
    }

    async fn run_child(
        &self,
        scratch: &Path,
        source_path: &Path,
        limits: SandboxLimits,
    ) -> Result<ExecutionReport, SandboxError> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(source_path)
            .current_dir(scratch)
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let cpu_secs = limits.cpu_time_secs;
            let memory_bytes = limits.memory_bytes;
            unsafe {
                command.pre_exec(move || {
                    let cpu = libc::rlimit {
                        rlim_cur: cpu_secs as libc::rlim_t,
                        rlim_max: (cpu_secs + 1) as libc::rlim_t,
                    };
                    if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    let mem = libc::rlimit {
                        rlim_cur: memory_bytes as libc::rlim_t,
                        rlim_max: memory_bytes as libc::rlim_t,
                    };
                    if libc::setrlimit(libc::RLIMIT_AS, &mem) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        // Drain pipes concurrently so a chatty child cannot deadlock on a
        // full pipe buffer.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let started = Instant::now();
        let deadline = started + Duration::from_secs(limits.wall_clock_secs);
        let mut peak_mem_kb: u64 = 0;
        let mut cpu_ms: u64 = 0;
        let mut timed_out = false;

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break Some(status.map_err(|e| SandboxError::Io(e.to_string()))?);
                }
                _ = tokio::time::sleep(SAMPLE_INTERVAL) => {
                    if let Some(pid) = pid {
                        if let Some((sampled_cpu, sampled_mem)) = sample_proc(pid) {
                            cpu_ms = cpu_ms.max(sampled_cpu);
                            peak_mem_kb = peak_mem_kb.max(sampled_mem);
                        }
                    }
                    if Instant::now() >= deadline {
                        timed_out = true;
                        if let Err(e) = child.kill().await {
                            warn!("failed to kill timed-out sandbox child: {e}");
                        }
                        break None;
                    }
                }
            }
        };

        let wall_ms = started.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        let (exit_code, signal) = match status {
            Some(status) => exit_code_of(status),
            None => (SIGKILL_EXIT, Some(libc_sigkill())),
        };

        // RLIMIT_AS shows up either as an interpreter-level allocation
        // failure or as a kill near the cap; RLIMIT_CPU as SIGXCPU/SIGKILL.
        let oom = !timed_out
            && (stderr.contains("MemoryError")
                || (signal == Some(9) && peak_mem_kb * 1024 >= limits.memory_bytes * 9 / 10));
        let cpu_exhausted = signal == Some(24)
            || (signal == Some(9) && cpu_ms >= limits.cpu_time_secs * 1000 * 9 / 10);

        let report = ExecutionReport {
            exit_code,
            stdout,
            stderr,
            wall_ms,
            cpu_ms,
            peak_mem_kb,
            timed_out: timed_out || (cpu_exhausted && !oom),
            oom,
        };
        debug!(
            exit = report.exit_code,
            wall_ms = report.wall_ms,
            timed_out = report.timed_out,
            oom = report.oom,
            "sandbox run finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn execute(
        &self,
        code: &str,
        test_case: &str,
        limits: SandboxLimits,
    ) -> Result<ExecutionReport, SandboxError> {
        // Admission control before queuing on the semaphore.
        let admitted = self.admitted.fetch_add(1, Ordering::SeqCst);
        if admitted >= self.max_admitted {
            self.admitted.fetch_sub(1, Ordering::SeqCst);
            metrics::counter!("sandbox_overloaded_total").increment(1);
            return Err(SandboxError::Overloaded);
        }

        let result = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| SandboxError::Io(e.to_string()))?;

            let scratch = tempfile::Builder::new()
                .prefix("evolution-sandbox-")
                .tempdir()
                .map_err(|e| SandboxError::Io(e.to_string()))?;
            let source_path = scratch.path().join("submission.py");
            let combined = format!("{code}\n\n{test_case}\n");
            tokio::fs::write(&source_path, combined)
                .await
                .map_err(|e| SandboxError::Io(e.to_string()))?;

            self.run_child(scratch.path(), &source_path, limits).await
        }
        .await;

        self.admitted.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> (i32, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (128 + signal, Some(signal));
        }
    }
    (status.code().unwrap_or(-1), None)
}

fn libc_sigkill() -> i32 {
    9
}

/// Sample (cpu_ms, mem_kb) for a live pid. Linux only; elsewhere the
/// measurements stay zero.
#[cfg(target_os = "linux")]
fn sample_proc(pid: u32) -> Option<(u64, u64)> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let mem_kb = status
        .lines()
        .find(|l| l.starts_with("VmHWM:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Fields 14/15 (utime/stime) come after the parenthesised comm, which
    // may itself contain spaces.
    let after_comm = stat.rsplit(')').next()?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11).and_then(|v| v.parse().ok()).unwrap_or(0);
    let stime: u64 = fields.get(12).and_then(|v| v.parse().ok()).unwrap_or(0);
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    let ticks_per_sec = if ticks_per_sec > 0 { ticks_per_sec as u64 } else { 100 };
    let cpu_ms = (utime + stime) * 1000 / ticks_per_sec;
    Some((cpu_ms, mem_kb))
}

#[cfg(not(target_os = "linux"))]
fn sample_proc(_pid: u32) -> Option<(u64, u64)> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_sandbox() -> ProcessSandbox {
        ProcessSandbox::new("/bin/sh", 2, 4)
    }

    fn limits() -> SandboxLimits {
        SandboxLimits {
            cpu_time_secs: 5,
            wall_clock_secs: 2,
            memory_bytes: 256 * 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn passing_test_exits_zero() {
        let sandbox = sh_sandbox();
        let report = sandbox
            .execute(
                "add() { echo $(($1 + $2)); }",
                "[ \"$(add 2 3)\" = \"5\" ] || exit 1",
                limits(),
            )
            .await
            .unwrap();
        assert_eq!(report.exit_code, 0, "stderr: {}", report.stderr);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn failing_test_surfaces_exit_code() {
        let sandbox = sh_sandbox();
        let report = sandbox.execute("x=1", "exit 3", limits()).await.unwrap();
        assert_eq!(report.exit_code, 3);
        assert!(!report.passed());
        assert!(report.failure_reason().is_some());
    }

    #[tokio::test]
    async fn stdout_and_stderr_are_captured() {
        let sandbox = sh_sandbox();
        let report = sandbox
            .execute("echo out-marker", "echo err-marker >&2", limits())
            .await
            .unwrap();
        assert!(report.stdout.contains("out-marker"));
        assert!(report.stderr.contains("err-marker"));
    }

    #[tokio::test]
    async fn wall_clock_breach_is_timed_out() {
        let sandbox = sh_sandbox();
        let started = Instant::now();
        let report = sandbox.execute("sleep 30", "", limits()).await.unwrap();
        assert!(report.timed_out);
        assert!(!report.passed());
        // Killed near the 2 s wall limit, well before the sleep finishes.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn child_runs_with_clean_environment() {
        std::env::set_var("EVOLUTION_SECRET_CANARY", "leak");
        let sandbox = sh_sandbox();
        let report = sandbox
            .execute("", "[ -z \"$EVOLUTION_SECRET_CANARY\" ] || exit 7", limits())
            .await
            .unwrap();
        assert_eq!(report.exit_code, 0);
    }

    #[tokio::test]
    async fn overload_fails_fast() {
        // One runner, zero queue slots: a second concurrent submission must
        // be rejected rather than queued.
        let sandbox = Arc::new(ProcessSandbox::new("/bin/sh", 1, 0));
        let busy = {
            let sandbox = sandbox.clone();
            tokio::spawn(async move { sandbox.execute("sleep 1", "", limits()).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = sandbox.execute("exit 0", "", limits()).await;
        assert!(matches!(second, Err(SandboxError::Overloaded)));
        let first = busy.await.unwrap().unwrap();
        assert_eq!(first.exit_code, 0);
    }
}
