//! Configuration loading for rule-proxy.
//!
//! Configuration is loaded from a TOML file (default: `rule-proxy.toml`). The
//! route table can also be given in the compact form used by the harness,
//! `http://hs1:8008,3000;http://hs2:8008,3001`, via `--routes`.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for rule-proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Administrative channel configuration.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Forwarding configuration.
    #[serde(default)]
    pub proxy: ForwardConfig,
    /// Callback dispatch configuration.
    #[serde(default)]
    pub callbacks: CallbackConfig,
    /// Upstream routes, one listener each.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Administrative channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bind address for the admin HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_admin_bind")]
    pub bind_address: String,
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Host the route listeners bind on (default: 0.0.0.0).
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    /// Maximum request body buffered for matching and forwarding (default: 10MB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Upstream request timeout in seconds (default: 120, long-poll friendly).
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

/// Callback dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    /// Timeout for one callback POST in seconds (default: 5).
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
}

/// One upstream route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    /// Base URL traffic is forwarded to, e.g. `http://hs1:8008`.
    pub upstream: String,
    /// Port the proxy listens on for this upstream (0 = ephemeral).
    pub listen_port: u16,
}

// Default value functions
fn default_admin_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_upstream_timeout() -> u64 {
    120
}

fn default_callback_timeout() -> u64 {
    5
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: default_admin_bind(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            max_body_bytes: default_max_body_bytes(),
            upstream_timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_callback_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            proxy: ForwardConfig::default(),
            callbacks: CallbackConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Config listening on loopback ephemeral ports, for in-process use.
    pub fn loopback(upstreams: &[&str]) -> Self {
        Self {
            admin: AdminConfig {
                bind_address: "127.0.0.1:0".into(),
            },
            proxy: ForwardConfig {
                listen_host: "127.0.0.1".into(),
                ..ForwardConfig::default()
            },
            callbacks: CallbackConfig::default(),
            routes: upstreams
                .iter()
                .map(|u| RouteConfig {
                    upstream: u.to_string(),
                    listen_port: 0,
                })
                .collect(),
        }
    }
}

/// Parse the compact route table `upstream,port;upstream,port`.
pub fn parse_routes(table: &str) -> Result<Vec<RouteConfig>, ConfigError> {
    table.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (upstream, port) = entry
                .rsplit_once(',')
                .ok_or_else(|| ConfigError::InvalidRoute(entry.to_string()))?;
            let listen_port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidRoute(entry.to_string()))?;
            let upstream = upstream.trim().trim_end_matches('/');
            if !upstream.starts_with("http://") && !upstream.starts_with("https://") {
                return Err(ConfigError::InvalidRoute(entry.to_string()));
            }
            Ok(RouteConfig {
                upstream: upstream.to_string(),
                listen_port,
            })
        })
        .collect()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Malformed entry in a compact route table.
    #[error("invalid route entry: {0:?}")]
    InvalidRoute(String),
    /// No routes configured.
    #[error("no upstream routes configured")]
    NoRoutes,
}
