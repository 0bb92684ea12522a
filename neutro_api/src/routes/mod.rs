pub mod health;
pub mod metrics;
pub mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/predict", post(predict::predict))
        .route("/healthz", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
