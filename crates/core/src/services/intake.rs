//! Vote intake.
//!
//! Both transports end up in [`VoteIntake::cast`]: the HTTP handler through
//! [`VoteIntake::vote`] and the streaming connection through
//! [`VoteIntake::submit`]. Identity resolution differs per path; everything
//! after it is shared.

use std::time::Duration;

use livepoll_common::config::VotingConfig;
use tokio::sync::mpsc;

use super::identity::TokenVerifier;
use super::ledger::VoteLedger;
use super::room::{Observer, ObserverId, PollSnapshot, RoomRegistry};
use crate::error::VoteError;
use crate::models::{Poll, VoterId};

/// Bounded linear backoff for transient vote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one.
    pub retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Fail on the first transient error.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl From<&VotingConfig> for RetryPolicy {
    fn from(config: &VotingConfig) -> Self {
        Self::new(config.transient_retries, config.retry_backoff())
    }
}

/// Per-connection state of a streaming client.
///
/// Dropping the session removes its observer from every room.
pub struct PushSession {
    observer: Observer,
    voter: Option<VoterId>,
    rooms: RoomRegistry,
}

impl PushSession {
    #[must_use]
    pub const fn observer_id(&self) -> ObserverId {
        self.observer.id()
    }

    /// Identity bound to this connection, if any.
    #[must_use]
    pub const fn voter(&self) -> Option<&VoterId> {
        self.voter.as_ref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.voter.is_some()
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        self.rooms.disconnect(self.observer.id());
    }
}

/// Entry point for votes from either transport.
#[derive(Clone)]
pub struct VoteIntake {
    ledger: VoteLedger,
    verifier: TokenVerifier,
    retry: RetryPolicy,
}

impl VoteIntake {
    #[must_use]
    pub const fn new(ledger: VoteLedger, verifier: TokenVerifier, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            verifier,
            retry,
        }
    }

    #[must_use]
    pub const fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Start a streaming session. The receiver yields every snapshot pushed
    /// to the session's observer.
    #[must_use]
    pub fn open_session(&self) -> (PushSession, mpsc::UnboundedReceiver<PollSnapshot>) {
        let (observer, rx) = Observer::channel();
        tracing::debug!(observer = %observer.id(), "Push session opened");
        let session = PushSession {
            observer,
            voter: None,
            rooms: self.ledger.rooms().clone(),
        };
        (session, rx)
    }

    /// Bind the token's identity to the session.
    ///
    /// A session keeps its first identity; a token for someone else is rejected.
    pub fn authenticate(
        &self,
        session: &mut PushSession,
        token: &str,
    ) -> Result<VoterId, VoteError> {
        let voter = self
            .verifier
            .verify(token)
            .map_err(|_| VoteError::Unauthenticated)?;

        match &session.voter {
            Some(bound) if *bound != voter => {
                tracing::warn!(
                    observer = %session.observer_id(),
                    bound = %bound,
                    presented = %voter,
                    "Session tried to switch identity"
                );
                Err(VoteError::Unauthenticated)
            }
            Some(_) => Ok(voter),
            None => {
                tracing::debug!(observer = %session.observer_id(), voter_id = %voter, "Push session authenticated");
                session.voter = Some(voter.clone());
                Ok(voter)
            }
        }
    }

    /// Subscribe the session to a poll's room and send it the current snapshot.
    pub async fn join(
        &self,
        session: &PushSession,
        poll_id: &str,
    ) -> Result<Option<Poll>, VoteError> {
        self.ledger.subscribe(poll_id, &session.observer).await
    }

    /// Unsubscribe the session from a poll's room.
    pub fn leave(&self, session: &PushSession, poll_id: &str) -> bool {
        self.ledger.unsubscribe(poll_id, &session.observer)
    }

    /// Synchronous path: the caller waits for the updated snapshot.
    pub async fn vote(
        &self,
        voter: Option<&VoterId>,
        poll_id: &str,
        option_id: &str,
    ) -> Result<Poll, VoteError> {
        let voter = voter.ok_or(VoteError::Unauthenticated)?;
        self.cast(voter, poll_id, option_id).await
    }

    /// Push path: success is observed through the room broadcast.
    ///
    /// `claimed_voter` is the optional voter ID sent by the client; it must
    /// match the identity bound to the session.
    pub async fn submit(
        &self,
        session: &PushSession,
        poll_id: &str,
        option_id: &str,
        claimed_voter: Option<&str>,
    ) -> Result<Poll, VoteError> {
        let voter = session.voter().ok_or(VoteError::Unauthenticated)?;
        if let Some(claimed) = claimed_voter.filter(|claimed| *claimed != voter.as_str()) {
            tracing::warn!(
                poll_id = %poll_id,
                voter_id = %voter,
                claimed = %claimed,
                "Rejected vote for another identity"
            );
            return Err(VoteError::Unauthenticated);
        }
        self.cast(voter, poll_id, option_id).await
    }

    async fn cast(
        &self,
        voter: &VoterId,
        poll_id: &str,
        option_id: &str,
    ) -> Result<Poll, VoteError> {
        let mut attempt = 0;
        loop {
            match self.ledger.cast_vote(voter, poll_id, option_id).await {
                Err(err) if err.is_retryable() && attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::debug!(
                        poll_id = %poll_id,
                        voter_id = %voter,
                        attempt,
                        error = %err,
                        "Retrying vote"
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}
