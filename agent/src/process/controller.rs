//! OS-facing process primitives
//!
//! Spawning into a fresh process group, signal delivery to individual
//! processes or whole groups, and liveness probing. Everything platform
//! specific lives here so the supervisor logic stays signal-agnostic.

use std::path::Path;
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::errors::AgentError;

/// Spawn a shell command in its own process group.
///
/// The command runs under `sh -c`, so children it forks (the usual case for
/// build/run scripts) share the new group and can be signalled together.
pub fn spawn_in_group(command: &str, working_dir: &Path) -> Result<Child, AgentError> {
    debug!("Spawning command in new process group: {}", command);

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .process_group(0)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| AgentError::SpawnError(format!("Failed to spawn '{}': {}", command, e)))?;

    Ok(child)
}

/// Send a signal to a single process.
pub fn signal_process(pid: i32, sig: Signal) -> Result<(), AgentError> {
    signal::kill(Pid::from_raw(pid), sig)
        .map_err(|e| AgentError::TerminationError(format!("kill({}, {}): {}", pid, sig, e)))
}

/// Send a signal to an entire process group.
pub fn signal_group(pgid: i32, sig: Signal) -> Result<(), AgentError> {
    signal::killpg(Pid::from_raw(pgid), sig)
        .map_err(|e| AgentError::TerminationError(format!("killpg({}, {}): {}", pgid, sig, e)))
}

/// Resolve the process group id of a process.
pub fn group_of(pid: i32) -> Result<i32, AgentError> {
    unistd::getpgid(Some(Pid::from_raw(pid)))
        .map(|pgid| pgid.as_raw())
        .map_err(|e| AgentError::TerminationError(format!("getpgid({}): {}", pid, e)))
}

/// Probe whether a process is still alive (signal 0, no delivery).
pub fn is_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}
