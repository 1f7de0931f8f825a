//! Owns one worker's OS process and its output pump tasks.
//!
//! Lifecycle: preflight → spawn → apply nice/affinity best-effort → pump
//! stdout/stderr to per-worker log files while feeding lines to the
//! adapter's parser → on stop, SIGTERM then wait up to 3s then SIGKILL.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::adapters::Adapter;
use crate::clock::Clock;
use crate::error::SupervisorError;
use crate::model::{WorkerDefinition, WorkerMetrics, WorkerStatus};

const STOP_GRACE: Duration = Duration::from_secs(3);

pub struct WorkerInstance {
    pub definition: WorkerDefinition,
    adapter: Box<dyn Adapter>,
    clock: Arc<dyn Clock>,
    log_dir: PathBuf,
    child: AsyncMutex<Option<Child>>,
    started_at: AsyncMutex<Option<std::time::Instant>>,
    metrics: AsyncMutex<WorkerMetrics>,
}

impl WorkerInstance {
    pub fn new(
        definition: WorkerDefinition,
        adapter: Box<dyn Adapter>,
        clock: Arc<dyn Clock>,
        log_dir: PathBuf,
    ) -> Self {
        let metrics = WorkerMetrics::new(definition.id.clone());
        Self {
            definition,
            adapter,
            clock,
            log_dir,
            child: AsyncMutex::new(None),
            started_at: AsyncMutex::new(None),
            metrics: AsyncMutex::new(metrics),
        }
    }

    fn preflight(&self) -> Result<(), SupervisorError> {
        let exe = Path::new(&self.definition.executable);
        if !exe.exists() {
            return Err(SupervisorError::PreflightFailure {
                id: self.definition.id.clone(),
                reason: format!("executable not found: {}", self.definition.executable),
            });
        }
        ensure_executable(exe).map_err(|e| SupervisorError::PreflightFailure {
            id: self.definition.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Holds the `child` guard for the whole check-spawn-store sequence so
    /// two concurrent callers can never both observe `None` and both spawn
    /// a child for the same id.
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        self.preflight()?;

        let args = self.adapter.build_args(&self.definition);
        let stdout_path = self.log_dir.join(format!("{}.out.log", self.definition.id));
        let stderr_path = self.log_dir.join(format!("{}.err.log", self.definition.id));

        let mut command = Command::new(&self.definition.executable);
        command
            .args(&args)
            .envs(&self.definition.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| SupervisorError::SpawnFailure {
            id: self.definition.id.clone(),
            reason: e.to_string(),
        })?;

        apply_nice_and_affinity(&self.definition, child.id());

        *self.metrics.lock().await = WorkerMetrics::new(self.definition.id.clone());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        if let Some(stdout) = stdout {
            self.spawn_pump(stdout, stdout_path);
        }
        if let Some(stderr) = stderr {
            self.spawn_pump(stderr, stderr_path);
        }

        *self.started_at.lock().await = Some(std::time::Instant::now());
        info!(worker_id = %self.definition.id, "worker started");
        *guard = Some(child);
        Ok(())
    }

    fn spawn_pump<R>(self: &Arc<Self>, reader: R, log_path: PathBuf)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut file = match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .await
            {
                Ok(f) => f,
                Err(e) => {
                    warn!(worker_id = %this.definition.id, error = %e, "failed to open worker log file");
                    return;
                }
            };
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = file.write_all(line.as_bytes()).await;
                let _ = file.write_all(b"\n").await;
                let mut metrics = this.metrics.lock().await;
                this.adapter.parse_line(&line, &mut metrics);
            }
        });
    }

    /// SIGTERM, wait up to 3s, then SIGKILL if still alive.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            info!(worker_id = %self.definition.id, pid, "sending SIGTERM");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(worker_id = %self.definition.id, %status, "worker stopped gracefully");
            }
            Ok(Err(e)) => {
                warn!(worker_id = %self.definition.id, error = %e, "error waiting for worker");
            }
            Err(_) => {
                warn!(worker_id = %self.definition.id, "worker did not stop within grace period, sending SIGKILL");
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }

        *guard = None;
        *self.started_at.lock().await = None;
        Ok(())
    }

    /// Polls the child without blocking; `Some(code)` once it has exited.
    pub async fn poll_exit(&self) -> Option<i32> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                *guard = None;
                *self.started_at.lock().await = None;
                Some(status.code().unwrap_or(-1))
            }
            _ => None,
        }
    }

    /// `"stopped"` if no child handle is held, `"exited:<code>"` once the
    /// child has terminated, `"running"` otherwise. Unlike `poll_exit`,
    /// this does not clear the child handle on exit — that bookkeeping
    /// stays with the caller that drives status transitions.
    pub async fn status(&self) -> WorkerStatus {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            None => WorkerStatus::Stopped,
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => WorkerStatus::Exited(status.code().unwrap_or(-1)),
                _ => WorkerStatus::Running,
            },
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }

    pub async fn uptime_sec(&self) -> f64 {
        match *self.started_at.lock().await {
            Some(start) => start.elapsed().as_secs_f64(),
            None => 0.0,
        }
    }

    pub async fn metrics(&self) -> WorkerMetrics {
        self.metrics.lock().await.clone()
    }
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)?;
    let mut perms = metadata.permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Best-effort: a miner with a misconfigured nice value or affinity mask
/// should still run, just without the scheduling hint applied.
fn apply_nice_and_affinity(def: &WorkerDefinition, pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let nix_pid = Pid::from_raw(pid as i32);

    if let Some(nice) = def.nice {
        if let Err(e) = unsafe { libc_setpriority(pid as i32, nice) } {
            warn!(worker_id = %def.id, error = %e, "failed to set nice value");
        }
    }

    if !def.cpu_affinity.is_empty() {
        let mut cpu_set = nix::sched::CpuSet::new();
        for &cpu in &def.cpu_affinity {
            if cpu_set.set(cpu).is_err() {
                warn!(worker_id = %def.id, cpu, "invalid cpu index in cpu_affinity, skipping");
            }
        }
        if let Err(e) = nix::sched::sched_setaffinity(nix_pid, &cpu_set) {
            warn!(worker_id = %def.id, error = %e, "failed to set cpu affinity");
        }
    }
}

/// Thin wrapper around the libc `setpriority(2)` syscall: `nix` does not
/// expose a portable "set a given pid's nice value" helper across the
/// versions we depend on.
unsafe fn libc_setpriority(pid: i32, nice: i32) -> std::io::Result<()> {
    const PRIO_PROCESS: i32 = 0;
    let ret = libc::setpriority(PRIO_PROCESS as libc::__priority_which_t, pid as libc::id_t, nice);
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}
