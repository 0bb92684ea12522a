pub mod health;
pub mod index;
pub mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn studio_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index::index))
        .route("/predict", post(predict::predict))
        .route("/healthz", get(health::healthcheck))
}
