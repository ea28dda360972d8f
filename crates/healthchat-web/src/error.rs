use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use healthchat_core::proxy::ProxyMethod;

/// JSON error type for the server's own failures. Upstream errors are relayed
/// as-is and never go through here.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    /// Local 500 for a request that never reached upstream. The message is
    /// fixed per method; the underlying cause is only logged.
    pub fn forwarding(method: ProxyMethod, err: &healthchat_core::error::HealthchatError) -> Self {
        tracing::error!(%method, "proxy error: {err}");
        Self::internal(method.failure_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
