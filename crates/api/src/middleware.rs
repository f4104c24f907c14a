//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use livepoll_core::{PollService, VoteIntake};

use crate::streaming::StreamingState;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub intake: VoteIntake,
    pub streaming: StreamingState,
}

impl AppState {
    #[must_use]
    pub fn new(poll_service: PollService, intake: VoteIntake) -> Self {
        Self {
            poll_service,
            intake,
            streaming: StreamingState::new(),
        }
    }
}

/// Extract a bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware.
///
/// A valid token puts the caller's `VoterId` into the request extensions.
/// An invalid one is ignored here; handlers that need identity reject the
/// request through their extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()) {
        match state.intake.verifier().verify(token) {
            Ok(voter) => {
                req.extensions_mut().insert(voter);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid bearer token");
            }
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
