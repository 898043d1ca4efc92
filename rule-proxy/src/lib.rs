//! # rule-proxy
//!
//! Controllable HTTP reverse proxy for fault-injection testing.
//!
//! The proxy:
//! - Listens on one port per upstream route and forwards traffic unchanged
//! - Applies the active rule set: rewrite or short-circuit matching requests
//! - Reports matching exchanges to callback URLs, fire-and-forget
//! - Serves an administrative channel for replacing rules and managing sniffers
//!
//! ## Architecture
//!
//! ```text
//! client ──► :3000 ──┐                  ┌──► http://hs1:8008
//!                    │   rule-proxy     │
//! client ──► :3001 ──┤  ┌────────────┐  ├──► http://hs2:8008
//!                    └──┤ RuleEngine ├──┘
//!   test ──► :8080 ─────┤  (admin)   ├─────► callback URLs
//!                       └────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod forward;
pub mod http;
pub mod notify;
pub mod server;

pub use config::Config;
pub use engine::{Decision, Intercept, RuleEngine};
pub use error::ProxyError;
pub use server::{start, ProxyMetrics, RuleProxy, RunningProxy};
