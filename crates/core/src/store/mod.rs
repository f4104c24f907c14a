//! Poll persistence.
//!
//! Provides an abstraction over durable storage of poll aggregates so the
//! ledger can load and persist polls without depending on a specific backend.

#![allow(missing_docs)]

mod memory;
mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livepoll_common::AppResult;
use std::sync::Arc;

use crate::models::{Poll, VoteEntry, VoterId};

pub use memory::MemoryPollStore;
pub use sql::SqlPollStore;

/// Which polls a listing should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollQuery {
    /// Stored flag still active.
    Active,
    /// Active and not past the deadline at the given instant.
    Open(DateTime<Utc>),
    /// Created by the given user.
    CreatedBy(String),
    /// Voted on by the given voter.
    VotedBy(VoterId),
}

/// Trait for poll storage.
///
/// Every write is atomic for a single aggregate. Callers that need
/// read-modify-write atomicity serialize through the vote ledger.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Load a poll with its voters.
    async fn load(&self, poll_id: &str) -> AppResult<Option<Poll>>;

    /// Persist a newly created poll.
    async fn insert(&self, poll: &Poll) -> AppResult<()>;

    /// Persist lifecycle changes (activity flag, end date).
    async fn save(&self, poll: &Poll) -> AppResult<()>;

    /// Persist the updated tallies together with the ledger entry.
    async fn record_vote(&self, poll: &Poll, entry: &VoteEntry) -> AppResult<()>;

    /// List polls, newest first.
    async fn list(&self, query: PollQuery) -> AppResult<Vec<Poll>>;
}

/// Wrapper for shared PollStore trait object.
pub type PollStoreService = Arc<dyn PollStore>;
