//! Administrative channel.
//!
//! | Method   | Path             | Effect                                   |
//! |----------|------------------|------------------------------------------|
//! | `GET`    | `/health`        | Liveness and rule summary                |
//! | `GET`    | `/metrics`       | Prometheus counters                      |
//! | `GET`    | `/rules`         | Active rule set as last pushed           |
//! | `PUT`    | `/rules`         | Replace the active rule set              |
//! | `DELETE` | `/rules`         | Clear all rules                          |
//! | `POST`   | `/sniffers`      | Register a sniffer, returns its id       |
//! | `DELETE` | `/sniffers/{id}` | Remove one sniffer                       |
//! | `DELETE` | `/sniffers`      | Remove every sniffer                     |

pub mod health;
mod metrics;
mod rules;

use crate::server::RuleProxy;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the admin router.
pub fn build_router(proxy: Arc<RuleProxy>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/rules",
            get(rules::get_rules)
                .put(rules::put_rules)
                .delete(rules::clear_rules),
        )
        .route(
            "/sniffers",
            axum::routing::post(rules::add_sniffer).delete(rules::clear_sniffers),
        )
        .route("/sniffers/:id", delete(rules::remove_sniffer))
        .layer(Extension(proxy))
}

/// JSON error body for rejected admin calls.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Human-readable reason.
    pub error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    pub(crate) fn bad_request(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn not_found(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            status: StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
