//! Single-slot process supervisor
//!
//! Owns at most one supervised process at a time. Starting a new process
//! always fully terminates the previous one first. Each process generation
//! is watched by one monitor task implemented as a bounded loop: wait for
//! exit, check supersession, apply the restart budget, respawn.
//!
//! Locking: the slot `RwLock` is held only for pointer swaps so status reads
//! never block on a slow termination; an outer operation mutex serializes
//! start/stop sequences end to end.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::deploy::config::DeployConfig;
use crate::errors::AgentError;
use crate::process::controller;

/// Grace window after SIGTERM to the process group
const GROUP_TERM_GRACE: Duration = Duration::from_secs(3);

/// Grace window after SIGTERM to the individual process
const PROC_TERM_GRACE: Duration = Duration::from_secs(5);

/// Grace window after SIGKILL before declaring the process unkillable
const KILL_GRACE: Duration = Duration::from_secs(2);

/// A supervised process generation
struct ManagedProcess {
    pid: i32,
    started_at: DateTime<Utc>,
    restart_count: u32,
    config: DeployConfig,
    working_dir: PathBuf,
    /// Signals intent to stop; does not itself kill anything
    cancel_tx: broadcast::Sender<()>,
    /// Flips to true when the monitor observes the process exit
    exited_rx: watch::Receiver<bool>,
}

struct Inner {
    current: RwLock<Option<ManagedProcess>>,
    op_lock: Mutex<()>,
    /// Restart attempts made for the current generation chain
    restarts_attempted: AtomicU32,
    group_grace: Duration,
    term_grace: Duration,
    kill_grace: Duration,
}

/// Snapshot of the supervised process for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: i32,
    pub uptime_secs: i64,
    pub restart_count: u32,
    pub restarts_attempted: u32,
    pub config: Option<DeployConfig>,
    pub working_dir: Option<String>,
}

/// Single-slot process supervisor
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_timeouts(GROUP_TERM_GRACE, PROC_TERM_GRACE, KILL_GRACE)
    }

    /// Construct with custom escalation grace windows (shortened in tests)
    pub fn with_timeouts(group_grace: Duration, term_grace: Duration, kill_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(None),
                op_lock: Mutex::new(()),
                restarts_attempted: AtomicU32::new(0),
                group_grace,
                term_grace,
                kill_grace,
            }),
        }
    }

    /// Start a new supervised process, fully terminating any previous one.
    ///
    /// Termination failure of the old process is logged but does not block
    /// the new deployment. Fails only if the spawn itself fails.
    pub async fn start_process(
        &self,
        config: DeployConfig,
        working_dir: &Path,
    ) -> Result<(), AgentError> {
        let _op = self.inner.op_lock.lock().await;

        let previous = self.inner.current.write().await.take();
        if let Some(prev) = previous {
            let pid = prev.pid;
            info!("Stopping previous process {} before new deployment", pid);
            if let Err(e) = terminate(&self.inner, prev).await {
                warn!("Failed to terminate previous process {}: {}", pid, e);
            }
        }

        self.inner.restarts_attempted.store(0, Ordering::SeqCst);
        let managed = spawn_generation(&self.inner, config, working_dir.to_path_buf(), 0)?;
        *self.inner.current.write().await = Some(managed);
        Ok(())
    }

    /// Stop the current process. No-op if nothing is running.
    ///
    /// The slot is detached under the lock first and the detached process is
    /// terminated outside it, so the monitor's supersession check cannot
    /// deadlock against a slow termination.
    pub async fn stop_current(&self) -> Result<(), AgentError> {
        let _op = self.inner.op_lock.lock().await;

        let previous = self.inner.current.write().await.take();
        match previous {
            Some(prev) => {
                info!("Stopping process {}", prev.pid);
                terminate(&self.inner, prev).await
            }
            None => Ok(()),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.current.read().await.is_some()
    }

    /// PID of the current process, or 0 when nothing is running
    pub async fn current_pid(&self) -> i32 {
        self.inner.current.read().await.as_ref().map_or(0, |mp| mp.pid)
    }

    /// Snapshot for the status endpoint
    pub async fn status(&self) -> ProcessStatus {
        let slot = self.inner.current.read().await;
        let restarts_attempted = self.inner.restarts_attempted.load(Ordering::SeqCst);
        match slot.as_ref() {
            Some(mp) => ProcessStatus {
                running: true,
                pid: mp.pid,
                uptime_secs: Utc::now().signed_duration_since(mp.started_at).num_seconds(),
                restart_count: mp.restart_count,
                restarts_attempted,
                config: Some(mp.config.clone()),
                working_dir: Some(mp.working_dir.display().to_string()),
            },
            None => ProcessStatus {
                running: false,
                pid: 0,
                uptime_secs: 0,
                restart_count: 0,
                restarts_attempted,
                config: None,
                working_dir: None,
            },
        }
    }
}

/// Spawn a process and its monitor task, producing the slot entry.
fn spawn_generation(
    inner: &Arc<Inner>,
    config: DeployConfig,
    working_dir: PathBuf,
    restart_count: u32,
) -> Result<ManagedProcess, AgentError> {
    let command = run_command_for(&config, restart_count);
    let child = controller::spawn_in_group(&command, &working_dir)?;
    let pid = child
        .id()
        .map(|p| p as i32)
        .ok_or_else(|| AgentError::SpawnError("spawned process has no pid".to_string()))?;

    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    let (exited_tx, exited_rx) = watch::channel(false);

    info!("Started process {} ({})", pid, command);

    let managed = ManagedProcess {
        pid,
        started_at: Utc::now(),
        restart_count,
        config,
        working_dir,
        cancel_tx,
        exited_rx,
    };

    spawn_monitor(inner.clone(), child, pid, exited_tx, cancel_rx);
    Ok(managed)
}

fn run_command_for(config: &DeployConfig, restart_count: u32) -> String {
    if restart_count > 0 {
        if let Some(cmd) = &config.restart_command {
            return cmd.clone();
        }
    }
    config.run_command.clone()
}

/// Monitor loop for one process generation chain.
///
/// Blocks on the child's exit, then under the slot lock checks whether this
/// process is still the recorded current one. A superseded or cancelled
/// monitor exits without touching state. Otherwise it clears the slot and
/// applies the restart budget, continuing with the respawned child.
fn spawn_monitor(
    inner: Arc<Inner>,
    child: Child,
    pid: i32,
    exited_tx: watch::Sender<bool>,
    cancel_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut child = child;
        let mut pid = pid;
        let mut exited_tx = exited_tx;
        let mut cancel_rx = cancel_rx;

        loop {
            let status = child.wait().await;
            let _ = exited_tx.send(true);

            // A cancelled generation is being torn down by a caller that
            // already owns the slot entry
            if cancel_rx.try_recv().is_ok() {
                return;
            }

            // Supersession guard
            let mp = {
                let mut slot = inner.current.write().await;
                match slot.take() {
                    Some(mp) if mp.pid == pid => mp,
                    other => {
                        *slot = other;
                        return;
                    }
                }
            };

            let uptime = Utc::now().signed_duration_since(mp.started_at).num_seconds();
            match status {
                Ok(code) => info!("Process {} exited with {} after {}s", pid, code, uptime),
                Err(e) => warn!("Process {} wait failed after {}s: {}", pid, uptime, e),
            }

            if mp.config.max_restarts == 0 || mp.restart_count >= mp.config.max_restarts {
                if mp.config.max_restarts > 0 {
                    warn!(
                        "Restart budget ({}) exhausted for '{}', giving up",
                        mp.config.max_restarts, mp.config.run_command
                    );
                }
                return;
            }

            let next_count = mp.restart_count + 1;
            info!(
                "Restarting '{}' in {}s (attempt {}/{})",
                mp.config.run_command, mp.config.restart_delay, next_count, mp.config.max_restarts
            );
            tokio::time::sleep(Duration::from_secs(mp.config.restart_delay)).await;

            // A start or stop in flight owns the slot and must not be raced;
            // abandon the restart rather than install a second process behind
            // its back
            let Ok(_op) = inner.op_lock.try_lock() else {
                info!(
                    "Abandoning restart of '{}', another operation is in flight",
                    mp.config.run_command
                );
                return;
            };

            // A deployment started during the delay wins
            let mut slot = inner.current.write().await;
            if slot.is_some() {
                return;
            }

            inner.restarts_attempted.fetch_add(1, Ordering::SeqCst);
            let command = run_command_for(&mp.config, next_count);
            let new_child = match controller::spawn_in_group(&command, &mp.working_dir) {
                Ok(c) => c,
                Err(e) => {
                    error!("Restart spawn failed: {}", e);
                    return;
                }
            };
            let Some(new_pid) = new_child.id().map(|p| p as i32) else {
                error!("Restarted process exited before its pid could be read");
                return;
            };

            let (cancel_tx, new_cancel_rx) = broadcast::channel(1);
            let (new_exited_tx, new_exited_rx) = watch::channel(false);
            info!("Restarted process {} ({})", new_pid, command);

            *slot = Some(ManagedProcess {
                pid: new_pid,
                started_at: Utc::now(),
                restart_count: next_count,
                config: mp.config,
                working_dir: mp.working_dir,
                cancel_tx,
                exited_rx: new_exited_rx,
            });
            drop(slot);

            child = new_child;
            pid = new_pid;
            exited_tx = new_exited_tx;
            cancel_rx = new_cancel_rx;
        }
    });
}

/// Escalating termination: cancel intent, group SIGTERM with grace window,
/// individual SIGTERM raced against the exit channel, SIGKILL, final probe.
async fn terminate(inner: &Inner, mp: ManagedProcess) -> Result<(), AgentError> {
    let pid = mp.pid;

    // Tier 1: signal intent
    let _ = mp.cancel_tx.send(());

    // Tier 2: SIGTERM the whole group
    match controller::group_of(pid) {
        Ok(pgid) => {
            if let Err(e) = controller::signal_group(pgid, Signal::SIGTERM) {
                warn!("Group SIGTERM for {} failed: {}", pgid, e);
            }
            wait_for_death(pid, inner.group_grace).await;
        }
        Err(e) => warn!("Could not resolve process group of {}: {}", pid, e),
    }
    if !controller::is_alive(pid) {
        info!("Process {} terminated after group SIGTERM", pid);
        return Ok(());
    }

    // Tier 3: SIGTERM the process itself, race the grace window against exit
    if let Err(e) = controller::signal_process(pid, Signal::SIGTERM) {
        warn!("SIGTERM for {} failed: {}", pid, e);
    }
    let mut exited_rx = mp.exited_rx.clone();
    tokio::select! {
        _ = tokio::time::sleep(inner.term_grace) => {}
        // A closed channel means the monitor is gone, which also implies exit
        _ = exited_rx.wait_for(|exited| *exited) => {}
    }
    if !controller::is_alive(pid) {
        info!("Process {} terminated after SIGTERM", pid);
        return Ok(());
    }

    // Tier 4: SIGKILL
    warn!("Process {} survived SIGTERM, sending SIGKILL", pid);
    if let Err(e) = controller::signal_process(pid, Signal::SIGKILL) {
        warn!("SIGKILL for {} failed: {}", pid, e);
    }
    wait_for_death(pid, inner.kill_grace).await;

    // Tier 5: final probe
    if controller::is_alive(pid) {
        return Err(AgentError::TerminationError(format!(
            "process {} did not die after SIGKILL",
            pid
        )));
    }
    Ok(())
}

async fn wait_for_death(pid: i32, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while controller::is_alive(pid) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
