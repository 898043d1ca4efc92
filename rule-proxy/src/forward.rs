//! Route listeners: forward traffic upstream and apply the active rules.

use crate::engine::Intercept;
use crate::error::ProxyError;
use crate::notify;
use crate::server::RuleProxy;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rule_types::{CallbackEvent, RequestView};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Body returned for blocked requests.
const BLOCKED_BODY: &[u8] = b"{}";

/// Hop-by-hop headers never copied between client and upstream.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// State for one route listener.
#[derive(Clone)]
pub struct RouteState {
    proxy: Arc<RuleProxy>,
    upstream: Arc<str>,
}

/// Build the router for a route forwarding to `upstream`.
pub fn build_router(proxy: Arc<RuleProxy>, upstream: &str) -> Router {
    Router::new().fallback(proxy_handler).with_state(RouteState {
        proxy,
        upstream: Arc::from(upstream.trim_end_matches('/')),
    })
}

struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

async fn proxy_handler(State(route): State<RouteState>, req: Request) -> Response {
    let proxy = route.proxy;
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, proxy.config().proxy.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Rejecting {} {}: {}", parts.method, parts.uri, e);
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };

    let method = parts.method.as_str().to_string();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = header_fields(&parts.headers);

    let decision = proxy
        .engine()
        .decide(&RequestView::new(&method, &path, &headers))
        .await;
    proxy.metrics().requests_total.fetch_add(1, Ordering::Relaxed);

    let exchange = match decision.intercept {
        Some(Intercept::Block { status }) => {
            proxy.metrics().blocked_total.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Blocked {} {} with {}", method, path, status);
            blocked(status)
        }
        intercept => {
            match forward(&proxy, &route.upstream, &parts.method, &path, &parts.headers, body.clone())
                .await
            {
                Ok(mut exchange) => {
                    if let Some(Intercept::Override { status }) = intercept {
                        proxy.metrics().overridden_total.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            "Rewrote {} {} status {} -> {}",
                            method,
                            path,
                            exchange.status,
                            status
                        );
                        exchange.status = to_status(status);
                    }
                    exchange
                }
                Err(e) => {
                    proxy.metrics().upstream_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Upstream {} failed for {} {}: {}", route.upstream, method, path, e);
                    Exchange {
                        status: StatusCode::BAD_GATEWAY,
                        headers: HeaderMap::new(),
                        body: Bytes::from(e.to_string()),
                    }
                }
            }
        }
    };

    if !decision.notify.is_empty() {
        let event = Arc::new(CallbackEvent {
            method,
            path,
            headers,
            request_body: body.to_vec(),
            response_body: exchange.body.to_vec(),
            response_code: exchange.status.as_u16(),
        });
        notify::dispatch(
            proxy.http(),
            decision.notify,
            event,
            Duration::from_secs(proxy.config().callbacks.timeout_secs),
            proxy.metrics_arc(),
        );
    }

    let mut response = Response::new(Body::from(exchange.body));
    *response.status_mut() = exchange.status;
    *response.headers_mut() = exchange.headers;
    response
}

fn blocked(status: u16) -> Exchange {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Exchange {
        status: to_status(status),
        headers,
        body: Bytes::from_static(BLOCKED_BODY),
    }
}

async fn forward(
    proxy: &RuleProxy,
    upstream: &str,
    method: &axum::http::Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Exchange, ProxyError> {
    let url = format!("{}{}", upstream, path);
    let response = proxy
        .http()
        .request(method.clone(), &url)
        .headers(strip_hop_by_hop(headers))
        .timeout(Duration::from_secs(proxy.config().proxy.upstream_timeout_secs))
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let headers = strip_hop_by_hop(response.headers());
    let body = response.bytes().await?;

    Ok(Exchange {
        status,
        headers,
        body,
    })
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(*name);
    }
    out
}

fn to_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Flatten headers for filter matching and callback reports.
///
/// Repeated headers are joined with `, `.
pub fn header_fields(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}
