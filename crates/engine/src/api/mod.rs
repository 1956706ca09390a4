//! API layer - HTTP and WebSocket entry points.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::app::App;

pub mod http;
pub mod sessions;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_support;

pub use sessions::{RegistryError, SessionHandle, SessionLease, SessionRegistry};

/// Full router: HTTP routes plus the game socket.
pub fn router(app: Arc<App>) -> Router {
    http::routes()
        .route("/socket", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}
