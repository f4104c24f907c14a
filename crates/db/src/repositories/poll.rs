//! Poll repository.

use std::sync::Arc;

use crate::entities::{Poll, PollVote, poll, poll_vote};
use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new poll.
    pub async fn create(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a poll.
    pub async fn update(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write the updated tallies and the ledger row in one transaction.
    pub async fn record_vote(
        &self,
        poll: poll::ActiveModel,
        vote: poll_vote::ActiveModel,
    ) -> AppResult<poll::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        vote.insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let updated = poll
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(updated)
    }

    /// Polls whose stored flag is still active, newest first.
    pub async fn find_active(&self) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::IsActive.eq(true))
            .order_by_desc(poll::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Active polls whose deadline is absent or after `now`, newest first.
    pub async fn find_open(&self, now: DateTime<Utc>) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(poll::Column::EndDate.is_null())
                    .add(poll::Column::EndDate.gt(now)),
            )
            .order_by_desc(poll::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Polls created by a user, newest first.
    pub async fn find_by_creator(&self, creator_id: &str) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::CreatorId.eq(creator_id))
            .order_by_desc(poll::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Polls with the given IDs, newest first.
    pub async fn find_by_ids(&self, ids: Vec<String>) -> AppResult<Vec<poll::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Poll::find()
            .filter(poll::Column::Id.is_in(ids))
            .order_by_desc(poll::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Poll vote (ledger) repository for database operations.
#[derive(Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    /// Create a new poll vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Ledger rows for a poll in the order they were accepted.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<poll_vote::Model>> {
        PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .order_by_asc(poll_vote::Column::CreatedAt)
            .order_by_asc(poll_vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Ledger rows for several polls, oldest first.
    pub async fn find_by_polls(&self, poll_ids: Vec<String>) -> AppResult<Vec<poll_vote::Model>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }
        PollVote::find()
            .filter(poll_vote::Column::PollId.is_in(poll_ids))
            .order_by_asc(poll_vote::Column::CreatedAt)
            .order_by_asc(poll_vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of every poll a voter has a ledger row on.
    pub async fn find_poll_ids_by_voter(&self, voter_id: &str) -> AppResult<Vec<String>> {
        PollVote::find()
            .select_only()
            .column(poll_vote::Column::PollId)
            .filter(poll_vote::Column::VoterId.eq(voter_id))
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
