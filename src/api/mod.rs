//! API router for gbp-sync.
//!
//! Mounts all endpoint groups under /v1/:
//! - /v1/status: Health check
//! - /v1/sync: Pull accounts and locations from Google
//! - /v1/auth/events: Provider tokens from sign-in events
//! - /v1/google/*: OAuth connect flow and connection status
//! - /v1/locations: Stored locations
//! - /v1/dashboard: Aggregated metrics and reviews

pub mod routes;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/v1", routes::v1_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
