//! Rule and sniffer handlers.

use super::ApiError;
use crate::server::RuleProxy;
use axum::{body::Bytes, extract::Path, http::StatusCode, Extension, Json};
use rule_types::{RuleError, RuleSet, SniffCreated, SniffId, SniffRequest};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// `GET /rules`
pub async fn get_rules(Extension(proxy): Extension<Arc<RuleProxy>>) -> Json<RuleSet> {
    Json(proxy.engine().current().await)
}

/// `PUT /rules`: decode strictly, compile, then swap in the whole set.
pub async fn put_rules(
    Extension(proxy): Extension<Arc<RuleProxy>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let set = RuleSet::from_json(&body).map_err(ApiError::bad_request)?;
    proxy
        .engine()
        .replace(set.clone())
        .await
        .map_err(ApiError::bad_request)?;
    proxy
        .metrics()
        .rule_pushes_total
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        "Rules replaced: {}",
        serde_json::to_string(&set).unwrap_or_default()
    );
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /rules`
pub async fn clear_rules(Extension(proxy): Extension<Arc<RuleProxy>>) -> StatusCode {
    proxy.engine().clear().await;
    tracing::info!("Rules cleared");
    StatusCode::NO_CONTENT
}

/// `POST /sniffers`
pub async fn add_sniffer(
    Extension(proxy): Extension<Arc<RuleProxy>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SniffCreated>), ApiError> {
    let request: SniffRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(RuleError::Malformed(e.to_string())))?;
    let id = proxy
        .engine()
        .add_sniffer(&request)
        .map_err(ApiError::bad_request)?;
    tracing::info!("Sniffer {} added on {}", id, request.filter);
    Ok((StatusCode::CREATED, Json(SniffCreated { id })))
}

/// `DELETE /sniffers/{id}`
pub async fn remove_sniffer(
    Extension(proxy): Extension<Arc<RuleProxy>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SniffId::parse(&id).ok_or_else(|| ApiError::not_found(format!("no sniffer {}", id)))?;
    if proxy.engine().remove_sniffer(&id) {
        tracing::info!("Sniffer {} removed", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no sniffer {}", id)))
    }
}

/// `DELETE /sniffers`
pub async fn clear_sniffers(Extension(proxy): Extension<Arc<RuleProxy>>) -> StatusCode {
    proxy.engine().clear_sniffers();
    StatusCode::NO_CONTENT
}
