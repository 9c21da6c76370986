//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::deploy::deployer::Deployer;
use crate::errors::AgentError;
use crate::process::supervisor::ProcessSupervisor;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::update::engine::SelfUpdateEngine;

/// Run the pushdeploy agent until the shutdown signal fires
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing pushdeploy agent...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);

    let supervisor = Arc::new(ProcessSupervisor::new());

    let binary_path = std::env::current_exe()
        .map_err(|e| AgentError::ConfigError(format!("Cannot resolve own executable: {}", e)))?;
    let updater = Arc::new(SelfUpdateEngine::new(binary_path));

    let deployer = Arc::new(Deployer::new(
        supervisor.clone(),
        options.deploy_target_dir.clone(),
    ));

    let state = Arc::new(ServerState::new(
        supervisor.clone(),
        deployer,
        updater,
        options.gateway.clone(),
    ));

    let mut server_shutdown_rx = shutdown_tx.subscribe();
    let server_handle = serve(&options.server, state, async move {
        let _ = server_shutdown_rx.recv().await;
    })
    .await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(
        options.max_shutdown_delay,
        shutdown_impl(server_handle, supervisor),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            error!(
                "Shutdown timed out after {:?}, forcing shutdown...",
                options.max_shutdown_delay
            );
            std::process::exit(1);
        }
    }
}

async fn shutdown_impl(
    server_handle: JoinHandle<Result<(), AgentError>>,
    supervisor: Arc<ProcessSupervisor>,
) -> Result<(), AgentError> {
    // Server first, so no new work is admitted while we tear down
    server_handle
        .await
        .map_err(|e| AgentError::ShutdownError(e.to_string()))??;

    if let Err(e) = supervisor.stop_current().await {
        warn!("Failed to stop supervised process during shutdown: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
