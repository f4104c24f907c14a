//! HTTP API layer for livepoll.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: poll CRUD and the synchronous vote path under `/api/polls`
//! - **Extractors**: bearer-token voter identity
//! - **Middleware**: token verification
//! - **Streaming**: WebSocket rooms and the push vote path at `/streaming`
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

use axum::{Router, middleware as axum_middleware, routing::get};

pub use endpoints::router;
pub use middleware::AppState;
pub use streaming::{StreamingState, streaming_handler};

/// Full application router with auth applied, ready for outer layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
