//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the customization API under `/api` plus a health probe. CORS is open
//! so a browser dashboard served from another origin can save layouts.

pub mod customization;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/customization",
            get(customization::get_customization)
                .post(customization::create_customization)
                .put(customization::replace_customization),
        )
        .route(
            "/api/customization/boards/{board_id}",
            put(customization::put_board).delete(customization::delete_board),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
