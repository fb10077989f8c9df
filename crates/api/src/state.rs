use std::sync::Arc;

use crate::config::ServerConfig;
use crate::jobs::service::JobService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job launcher, registry, and artifact store.
    pub jobs: Arc<JobService>,
}
