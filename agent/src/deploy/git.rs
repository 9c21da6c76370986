//! Git repository synchronization

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::AgentError;

/// Sync a git repository: clone it if absent, otherwise fetch and hard-reset
/// to the remote branch tip. Reset rather than pull keeps a dirty or diverged
/// working tree from blocking a deployment.
pub async fn sync_repository(
    repo_url: &str,
    branch: &str,
    target_dir: &Path,
) -> Result<(), AgentError> {
    info!(
        "Syncing repository {} (branch: {}) to {}",
        repo_url,
        branch,
        target_dir.display()
    );

    if target_dir.join(".git").exists() {
        debug!("Target directory exists, fetching updates...");
        let status = Command::new("git")
            .current_dir(target_dir)
            .args(["fetch", "origin", branch])
            .status()
            .await
            .map_err(|e| AgentError::DeployError(format!("Failed to run git fetch: {}", e)))?;
        if !status.success() {
            return Err(AgentError::DeployError("Git fetch failed".to_string()));
        }

        let status = Command::new("git")
            .current_dir(target_dir)
            .args(["reset", "--hard", &format!("origin/{}", branch)])
            .status()
            .await
            .map_err(|e| AgentError::DeployError(format!("Failed to run git reset: {}", e)))?;
        if !status.success() {
            return Err(AgentError::DeployError("Git reset failed".to_string()));
        }
    } else {
        debug!("Cloning repository to {}...", target_dir.display());
        if let Some(parent) = target_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let status = Command::new("git")
            .args(["clone", "-b", branch, repo_url])
            .arg(target_dir)
            .status()
            .await
            .map_err(|e| AgentError::DeployError(format!("Failed to run git clone: {}", e)))?;
        if !status.success() {
            return Err(AgentError::DeployError("Git clone failed".to_string()));
        }
    }

    info!("Successfully synced repository");
    Ok(())
}
