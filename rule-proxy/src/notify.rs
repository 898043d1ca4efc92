//! Fire-and-forget callback delivery.
//!
//! Each notification is POSTed on its own spawned task. The caller never waits
//! for delivery and delivery failures are only logged.

use crate::server::ProxyMetrics;
use rule_types::CallbackEvent;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Deliver `event` to every URL in `urls`, one task per URL.
///
/// Returns the spawned handles; callers are free to drop them.
pub fn dispatch(
    http: &reqwest::Client,
    urls: Vec<String>,
    event: Arc<CallbackEvent>,
    timeout: Duration,
    metrics: Arc<ProxyMetrics>,
) -> Vec<tokio::task::JoinHandle<()>> {
    urls.into_iter()
        .map(|url| {
            let http = http.clone();
            let event = event.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let result = http
                    .post(&url)
                    .timeout(timeout)
                    .json(event.as_ref())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());

                match result {
                    Ok(_) => {
                        metrics.callbacks_sent.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Callback delivered: {} {} -> {}", event.method, event.path, url);
                    }
                    Err(e) => {
                        metrics.callback_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Callback to {} failed: {}", url, e);
                    }
                }
            })
        })
        .collect()
}
