//! HTTP routes.

use std::sync::Arc;

use axum::{extract::State, response::Html, routing::get, Json, Router};

use kibitz_shared::StatusResponse;

use crate::app::App;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
}

async fn index() -> Html<&'static str> {
    Html("<!doctype html><title>kibitz</title><p>Connect a chess client to <code>/socket</code>.</p>")
}

async fn status(State(app): State<Arc<App>>) -> Json<StatusResponse> {
    let all_tasks = tokio::runtime::Handle::current()
        .metrics()
        .num_alive_tasks();
    Json(StatusResponse {
        games: app.registry.len(),
        all_tasks,
        total_recent_games: app.registry.count_started(),
    })
}
