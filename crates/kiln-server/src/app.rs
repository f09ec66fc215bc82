//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::middleware::security;
use crate::search;
use crate::state::AppState;
use crate::static_files;

/// Path of the status stream WebSocket.
pub(crate) const LIVE_RELOAD_PATH: &str = "/__livereload";

/// Create the application router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(LIVE_RELOAD_PATH, get(live_reload::ws_handler))
        .route(
            static_files::RELOAD_SCRIPT_PATH,
            get(static_files::reload_script),
        )
        .route("/_search", post(search::search))
        .fallback(static_files::serve)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security::csp_layer())
                .layer(security::content_type_options_layer())
                .layer(security::frame_options_layer()),
        )
        .with_state(state)
}
