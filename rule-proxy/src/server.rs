//! RuleProxy coordination: shared state and listener lifecycle.

use crate::config::{Config, ConfigError, RouteConfig};
use crate::engine::RuleEngine;
use crate::error::{ProxyError, Result};
use crate::{forward, http};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Operational counters, monotonically increasing since startup.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    /// Requests received on route listeners.
    pub requests_total: AtomicU64,
    /// Requests answered without contacting upstream.
    pub blocked_total: AtomicU64,
    /// Responses whose status was rewritten.
    pub overridden_total: AtomicU64,
    /// Upstream requests that failed outright.
    pub upstream_errors: AtomicU64,
    /// Callback notifications delivered.
    pub callbacks_sent: AtomicU64,
    /// Callback notifications that failed.
    pub callback_failures: AtomicU64,
    /// Accepted rule pushes.
    pub rule_pushes_total: AtomicU64,
}

/// Shared proxy state.
pub struct RuleProxy {
    config: Config,
    engine: RuleEngine,
    metrics: Arc<ProxyMetrics>,
    http: reqwest::Client,
    started: Instant,
}

impl std::fmt::Debug for RuleProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleProxy")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl RuleProxy {
    /// Create proxy state from config.
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            config,
            engine: RuleEngine::new(),
            metrics: Arc::new(ProxyMetrics::default()),
            http,
            started: Instant::now(),
        })
    }

    /// Get the proxy configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the rule engine.
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Get the operational metrics.
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    /// Get a clone of the metrics Arc for background tasks.
    pub fn metrics_arc(&self) -> Arc<ProxyMetrics> {
        self.metrics.clone()
    }

    /// HTTP client used for forwarding and callbacks.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Seconds since the proxy state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// A started proxy: bound listeners plus a shutdown switch.
pub struct RunningProxy {
    proxy: Arc<RuleProxy>,
    admin_addr: SocketAddr,
    route_addrs: Vec<(RouteConfig, SocketAddr)>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningProxy {
    /// Shared proxy state.
    pub fn proxy(&self) -> &Arc<RuleProxy> {
        &self.proxy
    }

    /// Bound admin address.
    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    /// Admin base URL, e.g. `http://127.0.0.1:8080`.
    pub fn admin_url(&self) -> String {
        format!("http://{}", self.admin_addr)
    }

    /// Bound listener address per route, in configuration order.
    pub fn route_addrs(&self) -> &[(RouteConfig, SocketAddr)] {
        &self.route_addrs
    }

    /// Base URL of route `index`.
    pub fn route_url(&self, index: usize) -> Option<String> {
        self.route_addrs
            .get(index)
            .map(|(_, addr)| format!("http://{}", addr))
    }

    /// Stop all listeners and wait for them to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Listener task ended abnormally: {}", e);
            }
        }
    }
}

/// Bind the admin and route listeners and start serving.
///
/// Logs `rule-proxy listening` once every listener is bound; the harness uses
/// that line as the readiness signal.
pub async fn start(config: Config) -> Result<RunningProxy> {
    if config.routes.is_empty() {
        return Err(ConfigError::NoRoutes.into());
    }

    let proxy = Arc::new(RuleProxy::new(config)?);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let admin_bind = proxy.config().admin.bind_address.clone();
    let admin_listener = TcpListener::bind(&admin_bind)
        .await
        .map_err(|e| ProxyError::bind(&admin_bind, e))?;
    let admin_addr = admin_listener.local_addr()?;
    tasks.push(serve(
        admin_listener,
        http::build_router(proxy.clone()),
        shutdown_rx.clone(),
    ));

    let mut route_addrs = Vec::new();
    for route in &proxy.config().routes {
        let bind = format!("{}:{}", proxy.config().proxy.listen_host, route.listen_port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| ProxyError::bind(&bind, e))?;
        let addr = listener.local_addr()?;
        tracing::info!("Route {} -> {}", addr, route.upstream);
        tasks.push(serve(
            listener,
            forward::build_router(proxy.clone(), &route.upstream),
            shutdown_rx.clone(),
        ));
        route_addrs.push((route.clone(), addr));
    }

    tracing::info!(
        "rule-proxy listening (admin={}, routes={})",
        admin_addr,
        route_addrs.len()
    );

    Ok(RunningProxy {
        proxy,
        admin_addr,
        route_addrs,
        shutdown,
        tasks,
    })
}

fn serve(
    listener: TcpListener,
    router: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!("Listener error: {}", e);
        }
    })
}
