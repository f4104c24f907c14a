//! Vote rejection taxonomy.

use livepoll_common::AppError;
use thiserror::Error;

/// Why a vote attempt did not change the tally.
///
/// Every variant except [`VoteError::Transient`] is terminal for the attempt
/// and is reported only to the voter that made it, never to the poll's room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("Poll not found: {0}")]
    NotFound(String),

    #[error("Poll {0} is no longer active")]
    PollClosed(String),

    #[error("Option {option_id} not found on poll {poll_id}")]
    OptionNotFound { poll_id: String, option_id: String },

    #[error("You have already voted on poll {0}")]
    AlreadyVoted(String),

    #[error("No authenticated voter identity")]
    Unauthenticated,

    /// Storage failure or lock timeout; the aggregate was left untouched.
    #[error("Vote temporarily unavailable: {0}")]
    Transient(String),
}

impl VoteError {
    /// Whether the intake may retry the attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable code sent to clients, shared with the HTTP error codes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "POLL_NOT_FOUND",
            Self::PollClosed(_) => "POLL_CLOSED",
            Self::OptionNotFound { .. } => "OPTION_NOT_FOUND",
            Self::AlreadyVoted(_) => "ALREADY_VOTED",
            Self::Unauthenticated => "UNAUTHORIZED",
            Self::Transient(_) => "TEMPORARILY_UNAVAILABLE",
        }
    }

    /// Wrap a storage failure.
    pub(crate) fn storage(err: &AppError) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::NotFound(id) => Self::PollNotFound(id),
            VoteError::PollClosed(id) => Self::PollClosed(id),
            VoteError::OptionNotFound { option_id, .. } => Self::OptionNotFound(option_id),
            VoteError::AlreadyVoted(id) => Self::AlreadyVoted(id),
            VoteError::Unauthenticated => Self::Unauthorized,
            VoteError::Transient(msg) => Self::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_http_codes() {
        let errors = [
            VoteError::NotFound("p".into()),
            VoteError::PollClosed("p".into()),
            VoteError::OptionNotFound {
                poll_id: "p".into(),
                option_id: "o".into(),
            },
            VoteError::AlreadyVoted("p".into()),
            VoteError::Unauthenticated,
            VoteError::Transient("timeout".into()),
        ];

        for err in errors {
            let code = err.code();
            assert_eq!(AppError::from(err).error_code(), code);
        }
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(VoteError::Transient("db".into()).is_retryable());
        assert!(!VoteError::AlreadyVoted("p".into()).is_retryable());
        assert!(!VoteError::Unauthenticated.is_retryable());
    }
}
