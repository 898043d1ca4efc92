//! Health check endpoint.

use crate::server::RuleProxy;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Proxy version.
    pub version: String,
    /// Whether any rule is active.
    pub rules_active: bool,
    /// Number of registered sniffers.
    pub sniffers: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(proxy): Extension<Arc<RuleProxy>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rules_active: !proxy.engine().current().await.is_empty(),
        sniffers: proxy.engine().sniffer_count(),
        uptime_seconds: proxy.uptime_secs(),
    })
}
