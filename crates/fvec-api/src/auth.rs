//! Shared-secret API key authentication.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "X-API-Key";

/// Middleware requiring a matching `X-API-Key` header.
///
/// Missing and wrong keys both answer 401; the distinction is only logged.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key == state.config.api_key => next.run(request).await,
        Some(_) => {
            warn!("rejected request with wrong API key");
            ApiError::unauthorized("Invalid API key").into_response()
        }
        None => ApiError::unauthorized("Missing API key").into_response(),
    }
}
