pub mod proxy;

use std::sync::Arc;

use axum::response::Json;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(proxy::routes())
        .fallback(not_found)
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "upstream": state.proxy.base_url(),
        "listen": format!("{}:{}", state.config.web.host, state.config.web.port),
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
