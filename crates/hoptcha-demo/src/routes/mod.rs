//! HTTP route handlers for the demo server.

use axum::{
    Router,
    routing::{get, post},
};
use hoptcha::HoptchaLayer;
use hoptcha_common::constants::assets::CLIENT_SCRIPT_PATH;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod form;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Only /submit/ sits behind the gate
    let protected = Router::new()
        .route("/submit/", post(form::submit))
        .route_layer(HoptchaLayer::from_shared(state.gate.clone()));

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Demo form
        .route("/", get(form::index))
        .route(CLIENT_SCRIPT_PATH, get(form::client_script))
        .merge(protected)

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
