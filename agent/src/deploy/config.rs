//! Deployment descriptor parsing
//!
//! Deployed repositories declare how they are built and run in a key=value
//! text file (`deploy.conf`) at the repository root.

use std::path::Path;

use serde::Serialize;

use crate::errors::AgentError;

/// Name of the descriptor file looked up in a synced repository
pub const DESCRIPTOR_FILE: &str = "deploy.conf";

/// Declarative build/run configuration for a deployment.
///
/// Immutable once loaded; one instance travels with a supervised process
/// generation, and restarts carry the same config forward.
#[derive(Debug, Clone, Serialize)]
pub struct DeployConfig {
    /// Shell command that builds the application
    pub build_command: String,

    /// Shell command that runs the application
    pub run_command: String,

    /// Working directory, relative to the repo unless absolute
    pub working_dir: Option<String>,

    /// Environment label (informational, echoed in status)
    pub environment: String,

    /// Application port (informational, echoed in status)
    pub port: u16,

    /// Delay between automatic restarts, in seconds
    pub restart_delay: u64,

    /// Maximum automatic restarts before the supervisor gives up
    pub max_restarts: u32,

    /// Backup path override for self-update
    pub backup_binary: Option<String>,

    /// Optional command used instead of run_command on restart
    pub restart_command: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            build_command: String::new(),
            run_command: String::new(),
            working_dir: None,
            environment: "production".to_string(),
            port: 0,
            restart_delay: 5,
            max_restarts: 3,
            backup_binary: None,
            restart_command: None,
        }
    }
}

impl DeployConfig {
    /// Parse descriptor content. Unknown keys are ignored, malformed numeric
    /// values are a configuration error.
    pub fn parse(content: &str) -> Result<Self, AgentError> {
        let mut config = Self::default();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(AgentError::ConfigError(format!(
                    "{}:{}: expected key=value, got '{}'",
                    DESCRIPTOR_FILE,
                    lineno + 1,
                    line
                )));
            };

            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');

            match key {
                "build_command" => config.build_command = value.to_string(),
                "run_command" => config.run_command = value.to_string(),
                "working_dir" => config.working_dir = Some(value.to_string()),
                "environment" => config.environment = value.to_string(),
                "port" => {
                    config.port = value.parse().map_err(|_| {
                        AgentError::ConfigError(format!("invalid port: '{}'", value))
                    })?
                }
                "restart_delay" => {
                    config.restart_delay = value.parse().map_err(|_| {
                        AgentError::ConfigError(format!("invalid restart_delay: '{}'", value))
                    })?
                }
                "max_restarts" => {
                    config.max_restarts = value.parse().map_err(|_| {
                        AgentError::ConfigError(format!("invalid max_restarts: '{}'", value))
                    })?
                }
                "backup_binary" => config.backup_binary = Some(value.to_string()),
                "restart_command" => config.restart_command = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Load and parse a descriptor file.
    pub async fn load(path: &Path) -> Result<Self, AgentError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Validate the fields a target deployment requires.
    pub fn validate_for_deploy(&self) -> Result<(), AgentError> {
        if self.build_command.is_empty() {
            return Err(AgentError::ConfigError(
                "descriptor is missing build_command".to_string(),
            ));
        }
        if self.run_command.is_empty() {
            return Err(AgentError::ConfigError(
                "descriptor is missing run_command".to_string(),
            ));
        }
        Ok(())
    }
}
