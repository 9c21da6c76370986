//! Single-slot background jobs
//!
//! The webhook gateway acknowledges requests before deployment or
//! self-update work runs. Each kind of work gets one slot: an overlapping
//! delivery is skipped rather than run concurrently.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::errors::AgentError;

/// One-permit gate around a kind of background work
#[derive(Clone)]
pub struct JobSlot {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl JobSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Spawn the job if the slot is free. Returns false when a job of this
    /// kind is already in flight. Errors from the job are logged only;
    /// nothing is reported back to the caller (fire-and-forget contract).
    pub fn try_spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                let name = self.name;
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        error!("{} job failed: {}", name, e);
                    }
                    drop(permit);
                });
                true
            }
            Err(_) => {
                warn!("{} job already in progress, skipping", self.name);
                false
            }
        }
    }
}
