//! End-to-end scenarios against an in-process rule-proxy fronting a stub chat
//! server.
//!
//! The stub records every request it receives, so tests can tell requests the
//! proxy blocked apart from ones it forwarded.


use crate::controller::ProxyController;
use axum::extract::Request;
use axum::{Extension, Json, Router};
use rule_proxy::{Config, RunningProxy};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Room event returned by the stub's `/sync`.
pub const SYNC_MARKER: &str = "faultline-sync-marker";

type Hits = Arc<Mutex<Vec<String>>>;

/// Minimal chat server: records `METHOD path` and answers JSON.
pub struct StubServer {
    addr: SocketAddr,
    hits: Hits,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Hits = Arc::default();

        let router = Router::new()
            .fallback(stub_handler)
            .layer(Extension(hits.clone()));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            hits,
            shutdown: Some(shutdown),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received whose `METHOD path` contains `fragment`.
    pub fn hits(&self, fragment: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| hit.contains(fragment))
            .count()
    }

    pub fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn stub_handler(Extension(hits): Extension<Hits>, req: Request) -> Json<Value> {
    let path = req.uri().path().to_string();
    hits.lock()
        .unwrap()
        .push(format!("{} {}", req.method(), path));

    if path.ends_with("/sync") {
        Json(json!({
            "next_batch": "s1",
            "rooms": {
                "join": {
                    "!room:hs1": {
                        "timeline": {
                            "events": [{
                                "type": "m.room.message",
                                "content": { "msgtype": "m.text", "body": SYNC_MARKER }
                            }]
                        }
                    }
                }
            }
        }))
    } else {
        Json(json!({}))
    }
}

/// Stub server, proxy in front of it, and a controller for the proxy.
pub struct LocalTopology {
    pub upstream: StubServer,
    pub proxy: RunningProxy,
    pub controller: ProxyController,
    pub http: reqwest::Client,
}

impl LocalTopology {
    pub async fn start() -> Self {
        let upstream = StubServer::start().await;
        let upstream_url = upstream.url();
        let proxy = rule_proxy::start(Config::loopback(&[upstream_url.as_str()]))
            .await
            .unwrap();
        let controller = ProxyController::new(proxy.admin_url());
        Self {
            upstream,
            proxy,
            controller,
            http: reqwest::Client::new(),
        }
    }

    /// URL of `path` through the proxy.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.proxy.route_url(0).unwrap(), path)
    }

    /// Issue a request through the proxy with a bearer token; return its status.
    pub async fn send(&self, method: reqwest::Method, path: &str, token: &str) -> u16 {
        self.http
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    pub async fn stop(self) {
        self.proxy.shutdown().await;
        self.upstream.stop();
    }
}
