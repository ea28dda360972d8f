use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use healthchat_core::proxy::ProxyMethod;

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/proxy/{*path}",
        get(proxy_get)
            .post(proxy_post)
            .patch(proxy_patch)
            .delete(proxy_delete),
    )
}

async fn proxy_get(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    forward(&state, ProxyMethod::Get, &path, &headers, &[]).await
}

async fn proxy_post(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, ProxyMethod::Post, &path, &headers, &body).await
}

async fn proxy_patch(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, ProxyMethod::Patch, &path, &headers, &body).await
}

async fn proxy_delete(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    forward(&state, ProxyMethod::Delete, &path, &headers, &[]).await
}

async fn forward(
    state: &AppState,
    method: ProxyMethod,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    match state
        .proxy
        .forward(method, path, headers.get(AUTHORIZATION), body)
        .await
    {
        Ok(upstream) if !carries_body(upstream.status) => upstream.status.into_response(),
        Ok(upstream) => (upstream.status, Json(upstream.body)).into_response(),
        Err(e) => ApiError::forwarding(method, &e).into_response(),
    }
}

/// 1xx, 204 and 304 responses have no body on the wire.
fn carries_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}
