//! Scoped, read-only observation of proxied traffic.
//!
//! A sniffer reports every exchange matching its filter without changing it
//! and without consuming any rule's budget. Its lifetime is bounded by the
//! action passed to [`with_sniffed_endpoint`]: once that returns (or panics),
//! the handler is never invoked again.

use crate::callback::{CallbackError, CallbackServer};
use crate::controller::{ControllerError, ProxyController};
use futures_util::FutureExt;
use rule_types::{CallbackEvent, Filter, RuleError, SniffRequest};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors setting up a sniffer.
#[derive(Debug, Error)]
pub enum SniffError {
    /// The callback listener could not start.
    #[error(transparent)]
    Callback(#[from] CallbackError),
    /// The proxy refused or could not be reached.
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// The filter could not be built.
    #[error(transparent)]
    Filter(#[from] RuleError),
}

/// Observe exchanges matching `filter` while `action` runs.
///
/// `on_event` runs once per matching exchange, each on its own task. The
/// sniffer is unregistered and its listener stopped after `action` completes,
/// and a gate guarantees `on_event` is not called once this function returns.
/// A panic in `action` is resumed after cleanup.
pub async fn with_sniffed_endpoint<H, F, Fut, T>(
    controller: &ProxyController,
    advertise_host: &str,
    filter: Filter,
    on_event: H,
    action: F,
) -> Result<T, SniffError>
where
    H: Fn(CallbackEvent) + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let gate = Arc::new(RwLock::new(true));
    let handler_gate = gate.clone();
    let mut server = CallbackServer::start(advertise_host, move |event| {
        let open = handler_gate.read().unwrap_or_else(PoisonError::into_inner);
        if *open {
            on_event(event);
        }
    })
    .await?;

    let request = SniffRequest {
        filter,
        callback_url: server.url().to_string(),
    };
    let id = match controller.add_sniffer(&request).await {
        Ok(id) => id,
        Err(e) => {
            server.stop().await;
            return Err(e.into());
        }
    };
    tracing::debug!("Sniffer {} on '{}' -> {}", id, request.filter, request.callback_url);

    let outcome = AssertUnwindSafe(action()).catch_unwind().await;

    if let Err(e) = controller.remove_sniffer(&id).await {
        tracing::warn!("Failed to remove sniffer {}: {}", id, e);
    }
    close_gate(gate).await;
    server.stop().await;

    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Shut the gate, waiting for in-flight handler calls to finish.
async fn close_gate(gate: Arc<RwLock<bool>>) {
    let closed = tokio::task::spawn_blocking(move || {
        *gate.write().unwrap_or_else(PoisonError::into_inner) = false;
    })
    .await;
    if let Err(e) = closed {
        tracing::warn!("Failed to close sniffer gate: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_proxy_fails_setup() {
        let controller = ProxyController::new("http://127.0.0.1:9");
        let ran = std::sync::atomic::AtomicBool::new(false);

        let result = with_sniffed_endpoint(
            &controller,
            "127.0.0.1",
            Filter::path_contains("/sync").unwrap(),
            |_| {},
            || async { ran.store(true, std::sync::atomic::Ordering::SeqCst) },
        )
        .await;

        assert!(matches!(
            result,
            Err(SniffError::Controller(ControllerError::ConnectionFailed(_)))
        ));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
