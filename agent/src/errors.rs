//! Error types for the pushdeploy agent

use thiserror::Error;

/// Main error type for the pushdeploy agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Spawn error: {0}")]
    SpawnError(String),

    #[error("Termination error: {0}")]
    TerminationError(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Verification error: {0}")]
    VerificationError(String),

    #[error("Update error: {0}")]
    UpdateError(String),

    #[error("Rollback error: {0}")]
    RollbackError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
