//! Server state

use std::sync::Arc;

use crate::deploy::deployer::Deployer;
use crate::process::supervisor::ProcessSupervisor;
use crate::server::jobs::JobSlot;
use crate::update::engine::SelfUpdateEngine;

/// Gateway routing and authentication configuration
#[derive(Debug, Clone, Default)]
pub struct GatewayOptions {
    /// Shared webhook secret; `None` means open mode (no signature checks)
    pub webhook_secret: Option<String>,

    /// Branch allow-list (empty = allow all)
    pub allowed_branches: Vec<String>,

    /// Clone URL that routes to the self-update engine
    pub self_update_url: String,

    /// Clone URL that routes to the target deployer
    pub target_url: String,
}

/// State shared across HTTP handlers
pub struct ServerState {
    pub supervisor: Arc<ProcessSupervisor>,
    pub deployer: Arc<Deployer>,
    pub updater: Arc<SelfUpdateEngine>,
    pub gateway: GatewayOptions,
    pub deploy_jobs: JobSlot,
    pub update_jobs: JobSlot,
}

impl ServerState {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        deployer: Arc<Deployer>,
        updater: Arc<SelfUpdateEngine>,
        gateway: GatewayOptions,
    ) -> Self {
        Self {
            supervisor,
            deployer,
            updater,
            gateway,
            deploy_jobs: JobSlot::new("deployment"),
            update_jobs: JobSlot::new("self-update"),
        }
    }
}
