//! API routes.

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::handlers::{health, job_detail, process, ready, status};
use crate::state::AppState;

/// Create the API router.
///
/// Everything except the health/readiness probes sits behind the API key.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/process", post(process))
        .route("/status/:job_id", get(status))
        .route("/jobs/:job_id", get(job_detail))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let open = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    Router::new()
        .merge(protected)
        .merge(open)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// Create CORS layer from configured origins.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(AllowOrigin::list(origins))
    }
}
