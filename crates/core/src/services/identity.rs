//! Voter identity.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the voter ID. The verifier is
//! the only place a [`VoterId`] is minted from client input.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use livepoll_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::models::VoterId;

/// Longest voter ID the ledger can store.
pub const MAX_VOTER_ID_LEN: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Verifies bearer tokens and resolves them to voter identities.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for the given shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Resolve a token to the voter it was issued for.
    pub fn verify(&self, token: &str) -> AppResult<VoterId> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected voter token");
            AppError::Unauthorized
        })?;

        let sub = &data.claims.sub;
        if sub.trim().is_empty() || sub.chars().count() > MAX_VOTER_ID_LEN {
            tracing::debug!(len = sub.len(), "Rejected voter token with unusable subject");
            return Err(AppError::Unauthorized);
        }
        Ok(VoterId::from(data.claims.sub))
    }

    /// Issue a token for a user, valid for `ttl`.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now.saturating_add(ttl),
            iat: now,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}
