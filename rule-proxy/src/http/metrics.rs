//! Prometheus metrics endpoint.

use crate::server::RuleProxy;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
pub async fn metrics_handler(Extension(proxy): Extension<Arc<RuleProxy>>) -> impl IntoResponse {
    let m = proxy.metrics();

    let sniffers = proxy.engine().sniffer_count();
    let requests = m.requests_total.load(Ordering::Relaxed);
    let blocked = m.blocked_total.load(Ordering::Relaxed);
    let overridden = m.overridden_total.load(Ordering::Relaxed);
    let upstream_errors = m.upstream_errors.load(Ordering::Relaxed);
    let callbacks = m.callbacks_sent.load(Ordering::Relaxed);
    let callback_failures = m.callback_failures.load(Ordering::Relaxed);
    let pushes = m.rule_pushes_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP rule_proxy_sniffers_active Number of registered sniffers
# TYPE rule_proxy_sniffers_active gauge
rule_proxy_sniffers_active {sniffers}

# HELP rule_proxy_info Proxy information
# TYPE rule_proxy_info gauge
rule_proxy_info{{version="{version}"}} 1

# HELP rule_proxy_requests_total Requests received on route listeners
# TYPE rule_proxy_requests_total counter
rule_proxy_requests_total {requests}

# HELP rule_proxy_blocked_total Requests answered without contacting upstream
# TYPE rule_proxy_blocked_total counter
rule_proxy_blocked_total {blocked}

# HELP rule_proxy_overridden_total Responses whose status was rewritten
# TYPE rule_proxy_overridden_total counter
rule_proxy_overridden_total {overridden}

# HELP rule_proxy_upstream_errors_total Upstream requests that failed
# TYPE rule_proxy_upstream_errors_total counter
rule_proxy_upstream_errors_total {upstream_errors}

# HELP rule_proxy_callbacks_sent_total Callback notifications delivered
# TYPE rule_proxy_callbacks_sent_total counter
rule_proxy_callbacks_sent_total {callbacks}

# HELP rule_proxy_callback_failures_total Callback notifications that failed
# TYPE rule_proxy_callback_failures_total counter
rule_proxy_callback_failures_total {callback_failures}

# HELP rule_proxy_rule_pushes_total Accepted rule set pushes
# TYPE rule_proxy_rule_pushes_total counter
rule_proxy_rule_pushes_total {pushes}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
