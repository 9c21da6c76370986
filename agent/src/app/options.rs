//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::server::state::GatewayOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// HTTP server configuration
    pub server: ServerOptions,

    /// Webhook gateway configuration
    pub gateway: GatewayOptions,

    /// Directory the target application is cloned into
    pub deploy_target_dir: PathBuf,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            gateway: GatewayOptions::default(),
            deploy_target_dir: PathBuf::from("/var/lib/pushdeploy/app"),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8099,
        }
    }
}
