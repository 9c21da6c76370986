//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Shared secret for webhook signature verification.
    /// When unset, signature checking is skipped (open mode).
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Branch allow-list. Entries are exact names or trailing-`*` prefixes.
    /// An empty list allows every branch.
    #[serde(default)]
    pub allowed_branches: Vec<String>,

    /// Target application deployment configuration
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Self-update configuration
    #[serde(default)]
    pub self_update: SelfUpdateSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            webhook_secret: None,
            allowed_branches: Vec::new(),
            deploy: DeploySettings::default(),
            self_update: SelfUpdateSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8099
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Target application deployment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Clone URL of the target application repository
    #[serde(default)]
    pub repo_url: String,

    /// Directory the target repository is cloned into
    #[serde(default = "default_deploy_dir")]
    pub target_dir: String,
}

fn default_deploy_dir() -> String {
    "/var/lib/pushdeploy/app".to_string()
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            target_dir: default_deploy_dir(),
        }
    }
}

/// Self-update settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfUpdateSettings {
    /// Clone URL of the agent's own repository
    #[serde(default)]
    pub repo_url: String,
}
