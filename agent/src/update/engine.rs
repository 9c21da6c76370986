//! Self-update engine
//!
//! Rebuilds the agent from its own repository and atomically swaps the
//! running executable on disk. The live binary is backed up before any
//! destructive step, the replacement is a copy-then-rename next to the
//! binary (same filesystem, so the rename is atomic), and any failure after
//! the binary has been touched triggers an automatic rollback. The backup is
//! never deleted by a successful update.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::deploy::config::{DeployConfig, DESCRIPTOR_FILE};
use crate::deploy::git;
use crate::errors::AgentError;

/// Timeout for the post-replace smoke invocation
const SMOKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Self-update engine for the agent's own executable
pub struct SelfUpdateEngine {
    binary_path: PathBuf,
    scratch_dir: PathBuf,
    smoke_timeout: Duration,
    /// Backup location; tracks the descriptor override from the last update
    backup_path: RwLock<PathBuf>,
    /// Updates are explicitly single-flight; a concurrent call is rejected
    update_lock: Mutex<()>,
}

impl SelfUpdateEngine {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        let binary_path = binary_path.into();
        let scratch_dir = std::env::temp_dir().join("pushdeploy-update");
        Self::with_paths(binary_path, scratch_dir)
    }

    /// Construct with explicit paths (tests use tempdir fixtures)
    pub fn with_paths(binary_path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        let binary_path = binary_path.into();
        let backup_path = sibling(&binary_path, ".backup");
        Self {
            binary_path,
            scratch_dir: scratch_dir.into(),
            smoke_timeout: SMOKE_TIMEOUT,
            backup_path: RwLock::new(backup_path),
            update_lock: Mutex::new(()),
        }
    }

    /// Run a full self-update from the given repository/branch.
    ///
    /// Steps before the live binary is touched abort cleanly; failures during
    /// or after the atomic replace roll back to the backup. The scratch
    /// directory is removed on every exit path.
    pub async fn update(&self, repo_url: &str, branch: &str) -> Result<(), AgentError> {
        let _guard = self.update_lock.try_lock().map_err(|_| {
            AgentError::UpdateError("self-update already in progress".to_string())
        })?;

        info!("Starting self-update from {} (branch: {})", repo_url, branch);

        let result = async {
            git::sync_repository(repo_url, branch, &self.scratch_dir).await?;
            self.apply_update(&self.scratch_dir).await
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean scratch directory: {}", e);
            }
        }

        result
    }

    /// Steps 2-7 of the update protocol, run against an already-synced repo.
    async fn apply_update(&self, repo_dir: &Path) -> Result<(), AgentError> {
        let config = DeployConfig::load(&repo_dir.join(DESCRIPTOR_FILE)).await?;
        if config.build_command.is_empty() {
            return Err(AgentError::ConfigError(
                "update descriptor is missing build_command".to_string(),
            ));
        }

        let backup_path = match &config.backup_binary {
            Some(path) => PathBuf::from(path),
            None => sibling(&self.binary_path, ".backup"),
        };
        *self.backup_path.write().await = backup_path.clone();

        // Backup before anything destructive; a failed build must never
        // leave the system without a known-good backup.
        self.create_backup(&backup_path).await?;

        self.build(&config.build_command, repo_dir).await?;

        let artifact = repo_dir.join(binary_file_name(&self.binary_path)?);
        self.verify_artifact(&artifact).await?;

        // Destructive phase: replace and smoke-test, rolling back on failure
        if let Err(e) = self.install_and_verify(&artifact).await {
            error!("Update failed after touching the live binary: {}", e);
            match self.rollback_to(&backup_path).await {
                Ok(()) => warn!("Rolled back to the previous binary"),
                Err(re) => error!("Rollback failed: {}", re),
            }
            return Err(e);
        }

        info!("Self-update complete, backup kept at {}", backup_path.display());
        Ok(())
    }

    /// Restore the backed-up binary over the live one.
    ///
    /// The backup itself is left untouched so repeated rollbacks remain
    /// possible.
    pub async fn rollback(&self) -> Result<(), AgentError> {
        let backup_path = self.backup_path.read().await.clone();
        self.rollback_to(&backup_path).await
    }

    /// Whether a backup binary currently exists
    pub async fn has_backup(&self) -> bool {
        let backup_path = self.backup_path.read().await.clone();
        tokio::fs::try_exists(&backup_path).await.unwrap_or(false)
    }

    async fn create_backup(&self, backup_path: &Path) -> Result<(), AgentError> {
        if tokio::fs::try_exists(backup_path).await? {
            tokio::fs::remove_file(backup_path).await?;
        }

        tokio::fs::copy(&self.binary_path, backup_path)
            .await
            .map_err(|e| {
                AgentError::UpdateError(format!(
                    "Failed to back up {} to {}: {}",
                    self.binary_path.display(),
                    backup_path.display(),
                    e
                ))
            })?;

        let src = tokio::fs::metadata(&self.binary_path).await?;
        let dst = tokio::fs::metadata(backup_path).await?;
        if src.len() != dst.len() {
            return Err(AgentError::UpdateError(format!(
                "Backup verification failed: {} bytes copied, expected {}",
                dst.len(),
                src.len()
            )));
        }

        info!("Backed up current binary to {}", backup_path.display());
        Ok(())
    }

    async fn build(&self, build_command: &str, repo_dir: &Path) -> Result<(), AgentError> {
        info!("Building update: {}", build_command);

        let status = Command::new("sh")
            .current_dir(repo_dir)
            .args(["-c", build_command])
            .status()
            .await
            .map_err(|e| AgentError::BuildError(format!("Failed to run build command: {}", e)))?;

        if !status.success() {
            return Err(AgentError::BuildError(format!(
                "Build command exited with {}",
                status
            )));
        }
        Ok(())
    }

    async fn verify_artifact(&self, artifact: &Path) -> Result<(), AgentError> {
        let meta = tokio::fs::metadata(artifact).await.map_err(|_| {
            AgentError::VerificationError(format!(
                "built artifact not found at {}",
                artifact.display()
            ))
        })?;

        if !meta.is_file() {
            return Err(AgentError::VerificationError(format!(
                "built artifact {} is not a regular file",
                artifact.display()
            )));
        }

        set_executable(artifact).await?;
        Ok(())
    }

    /// Atomic replace plus post-replace smoke test.
    async fn install_and_verify(&self, artifact: &Path) -> Result<(), AgentError> {
        let staged = sibling(&self.binary_path, ".new");

        tokio::fs::copy(artifact, &staged).await.map_err(|e| {
            AgentError::UpdateError(format!("Failed to stage new binary: {}", e))
        })?;
        set_executable(&staged).await?;

        // Same-filesystem rename; no reader ever sees a partial binary
        tokio::fs::rename(&staged, &self.binary_path)
            .await
            .map_err(|e| {
                AgentError::UpdateError(format!("Failed to replace live binary: {}", e))
            })?;

        info!("Replaced live binary at {}", self.binary_path.display());
        self.smoke_test(&self.binary_path).await
    }

    async fn smoke_test(&self, binary: &Path) -> Result<(), AgentError> {
        let run = Command::new(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match tokio::time::timeout(self.smoke_timeout, run).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(AgentError::VerificationError(format!(
                "smoke test exited with {}",
                status
            ))),
            Ok(Err(e)) => Err(AgentError::VerificationError(format!(
                "smoke test failed to run: {}",
                e
            ))),
            Err(_) => Err(AgentError::VerificationError(
                "smoke test timed out".to_string(),
            )),
        }
    }

    async fn rollback_to(&self, backup_path: &Path) -> Result<(), AgentError> {
        if !tokio::fs::try_exists(backup_path).await.unwrap_or(false) {
            return Err(AgentError::RollbackError(format!(
                "no backup at {}",
                backup_path.display()
            )));
        }

        let staged = sibling(&self.binary_path, ".rollback");
        tokio::fs::copy(backup_path, &staged).await.map_err(|e| {
            AgentError::RollbackError(format!("Failed to stage backup: {}", e))
        })?;
        set_executable(&staged)
            .await
            .map_err(|e| AgentError::RollbackError(e.to_string()))?;
        tokio::fs::rename(&staged, &self.binary_path)
            .await
            .map_err(|e| {
                AgentError::RollbackError(format!("Failed to restore backup: {}", e))
            })?;

        info!(
            "Restored backup {} over {}",
            backup_path.display(),
            self.binary_path.display()
        );
        Ok(())
    }
}

/// Append a suffix to a path's file name (`agent` -> `agent.backup`)
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(suffix);
    path.with_file_name(name)
}

fn binary_file_name(binary: &Path) -> Result<&std::ffi::OsStr, AgentError> {
    binary
        .file_name()
        .ok_or_else(|| AgentError::UpdateError("binary path has no file name".to_string()))
}

async fn set_executable(path: &Path) -> Result<(), AgentError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(path, perms).await?;
    }
    Ok(())
}
