//! Ephemeral HTTP listener receiving proxy notifications.
//!
//! The proxy POSTs one JSON [`CallbackEvent`] per observed exchange. Each event
//! is handed to the user handler on its own blocking task, so a slow handler
//! never stalls the listener, and the proxy always gets an immediate 200.

use axum::{http::StatusCode, routing::post, Extension, Json, Router};
use rule_types::CallbackEvent;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handler invoked once per received event.
pub type EventHandler = Arc<dyn Fn(CallbackEvent) + Send + Sync>;

/// Errors starting the listener.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Could not bind a local port.
    #[error("failed to bind callback listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// A running callback listener.
pub struct CallbackServer {
    url: String,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("url", &self.url)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CallbackServer {
    /// Listen on an ephemeral port and advertise it as `http://{advertise_host}:{port}`.
    ///
    /// `advertise_host` is how the proxy reaches this process, e.g.
    /// `host.docker.internal` from inside a container or `127.0.0.1` in-process.
    pub async fn start<F>(advertise_host: &str, handler: F) -> Result<Self, CallbackError>
    where
        F: Fn(CallbackEvent) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("0.0.0.0:0").await?;
        let local_addr = listener.local_addr()?;
        let url = format!("http://{}:{}", advertise_host, local_addr.port());

        let handler: EventHandler = Arc::new(handler);
        let router = Router::new()
            .route("/", post(receive))
            .layer(Extension(handler));

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Callback listener error: {}", e);
            }
        });

        tracing::debug!("Callback server listening on {} ({})", local_addr, url);

        Ok(Self {
            url,
            local_addr,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// URL to register with the proxy.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Locally bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether [`stop`](Self::stop) has not been called yet.
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Stop listening. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Callback listener ended abnormally: {}", e);
            }
        }
    }
}

async fn receive(
    Extension(handler): Extension<EventHandler>,
    Json(event): Json<CallbackEvent>,
) -> StatusCode {
    tracing::trace!("Callback: {} {} -> {}", event.method, event.path, event.response_code);
    tokio::task::spawn_blocking(move || handler(event));
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn event(path: &str) -> CallbackEvent {
        CallbackEvent {
            method: "GET".into(),
            path: path.into(),
            headers: BTreeMap::new(),
            request_body: Vec::new(),
            response_body: b"{}".to_vec(),
            response_code: 200,
        }
    }

    #[tokio::test]
    async fn delivers_events_to_handler() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut server = CallbackServer::start("127.0.0.1", move |ev: CallbackEvent| {
            let _ = tx.send(ev.path);
        })
        .await
        .unwrap();
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::Client::new()
            .post(server.url())
            .json(&event("/_matrix/client/v3/sync"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path, "/_matrix/client/v3/sync");

        server.stop().await;
    }

    #[tokio::test]
    async fn slow_handler_does_not_stall_listener() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut server = CallbackServer::start("127.0.0.1", move |_| {
            std::thread::sleep(Duration::from_millis(300));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        let http = reqwest::Client::new();
        let started = std::time::Instant::now();
        for i in 0..3 {
            let response = http
                .post(server.url())
                .json(&event(&format!("/{}", i)))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
        }
        assert!(started.elapsed() < Duration::from_millis(900));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        server.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut server = CallbackServer::start("127.0.0.1", |_| {}).await.unwrap();
        let addr = server.local_addr();

        server.stop().await;
        assert!(!server.is_running());
        server.stop().await;

        let refused = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}", addr.port()))
            .json(&event("/"))
            .send()
            .await;
        assert!(refused.is_err());
    }

    #[tokio::test]
    async fn malformed_event_rejected() {
        let mut server = CallbackServer::start("127.0.0.1", |_| {}).await.unwrap();

        let response = reqwest::Client::new()
            .post(server.url())
            .header("content-type", "application/json")
            .body("{\"method\":\"GET\"}")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        server.stop().await;
    }
}
