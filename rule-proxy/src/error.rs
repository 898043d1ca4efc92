//! Error types for rule-proxy.

/// Main error type for rule-proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Could not bind a listener.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Upstream request failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub(crate) fn bind(addr: impl ToString, source: std::io::Error) -> Self {
        ProxyError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
