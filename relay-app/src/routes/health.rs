use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new().route("/api/v1/relay/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "checked_at": Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "queue": {
            "depth": state.queue.depth(),
            "capacity": state.queue.capacity(),
        }
    }))
}
