//! Per-service command handler sets.

use std::sync::Arc;

use crate::{log_error, Delivery, Request, Service, Version};

/// Capability to execute named commands for one service.
///
/// The dispatcher calls [`run_by_name`](Self::run_by_name) on its own task
/// for every parsed request. The implementation owns the delivery from then
/// on and must answer it (or report an error) through the [`Service`], which
/// acknowledges it. Commands it does not recognise go to
/// [`Service::run_common`].
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute `request.cmd` for `delivery`.
    async fn run_by_name(&self, request: Request, delivery: Delivery);

    /// Release resources on shutdown. Must close the broker session.
    async fn cleanup(&self);
}

/// Shared runner pointer handed to [`Service::dispatch`].
pub type RunnerPtr = Arc<dyn CommandRunner>;

/// Runner for services without commands of their own.
///
/// Answers `info` with its [`Version`] and leaves everything else to the
/// built-in command set.
pub struct BasicRunner {
    service: Service,
    version: Version,
}

impl BasicRunner {
    pub fn new(service: Service, version: Version) -> Self {
        Self { service, version }
    }

    pub fn into_ptr(self) -> RunnerPtr {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl CommandRunner for BasicRunner {
    async fn run_by_name(&self, request: Request, delivery: Delivery) {
        // ---
        match request.cmd.as_str() {
            "info" => self.service.info(&delivery, &self.version).await,
            _ => self.service.run_common(&request, &delivery).await,
        }
    }

    async fn cleanup(&self) {
        // ---
        if let Err(e) = self.service.close().await {
            log_error!("failed to close broker session: {e}");
        }
    }
}
