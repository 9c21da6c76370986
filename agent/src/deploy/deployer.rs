//! Target application deployment

use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::Command;
use tracing::info;

use crate::deploy::config::{DeployConfig, DESCRIPTOR_FILE};
use crate::deploy::git;
use crate::errors::AgentError;
use crate::process::supervisor::ProcessSupervisor;

/// Deploys the target application: syncs its repository, loads the
/// deployment descriptor, runs the build and hands the run command to the
/// process supervisor.
pub struct Deployer {
    supervisor: Arc<ProcessSupervisor>,
    target_dir: PathBuf,
}

impl Deployer {
    pub fn new(supervisor: Arc<ProcessSupervisor>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            target_dir: target_dir.into(),
        }
    }

    /// Run a full deployment of the given repository/branch.
    pub async fn deploy(&self, repo_url: &str, branch: &str) -> Result<(), AgentError> {
        info!("Deploying {} (branch: {})", repo_url, branch);

        git::sync_repository(repo_url, branch, &self.target_dir).await?;

        let config = DeployConfig::load(&self.target_dir.join(DESCRIPTOR_FILE)).await?;
        config.validate_for_deploy()?;

        let working_dir = match &config.working_dir {
            Some(dir) => {
                let dir = PathBuf::from(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    self.target_dir.join(dir)
                }
            }
            None => self.target_dir.clone(),
        };

        self.build(&config, &working_dir).await?;

        self.supervisor.start_process(config, &working_dir).await?;
        info!("Deployment of {} complete", repo_url);
        Ok(())
    }

    async fn build(&self, config: &DeployConfig, working_dir: &std::path::Path) -> Result<(), AgentError> {
        info!("Running build command: {}", config.build_command);

        let status = Command::new("sh")
            .current_dir(working_dir)
            .args(["-c", &config.build_command])
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
}
