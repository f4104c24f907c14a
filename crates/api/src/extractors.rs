//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use livepoll_common::AppError;
use livepoll_core::VoterId;

/// Authenticated voter extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub VoterId);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        parts
            .extensions
            .get::<VoterId>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional authenticated voter extractor.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<VoterId>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<VoterId>().cloned()))
    }
}
