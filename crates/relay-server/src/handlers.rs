use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::Json;
use relay_core::LatestSnapshot;
use serde_json::json;

use crate::server::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const LATEST_VIEW_HTML: &str = include_str!("../assets/latest_view.html");

/// `GET /latest`: the two cells, `null` until something arrives.
pub async fn latest(State(state): State<AppState>) -> Json<LatestSnapshot> {
    Json(state.latest.snapshot())
}

/// `GET /latest-view`: page that polls `/latest` every five seconds.
pub async fn latest_view() -> Html<&'static str> {
    Html(LATEST_VIEW_HTML)
}

/// `GET /`
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.registry.count(),
    }))
}
