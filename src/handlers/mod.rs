pub mod health_handlers;
pub mod namespace_handlers;

use crate::services::namespace_service::NamespaceService;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub namespace: NamespaceService,
    /// Cancelled on shutdown; long walks get a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(namespace: NamespaceService, shutdown: CancellationToken) -> Self {
        Self {
            namespace,
            shutdown,
        }
    }
}
