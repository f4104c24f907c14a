//! Poll service.

use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult, IdGenerator};
use serde::Serialize;

use super::ledger::VoteLedger;
use crate::models::{Poll, VoterId};
use crate::store::PollQuery;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_OPTION_LEN: usize = 100;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;

/// Poll service for creation, lookup and lifecycle.
#[derive(Clone)]
pub struct PollService {
    ledger: VoteLedger,
    id_gen: IdGenerator,
}

/// Input for creating a poll.
#[derive(Debug, Clone)]
pub struct CreatePollInput {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Per-user counts over the poll store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPollStats {
    pub polls_created: usize,
    pub polls_voted: usize,
    /// Votes cast on the user's own polls, by anyone.
    pub total_votes_received: u64,
}

impl CreatePollInput {
    /// Trim and check every field. Returns the cleaned input.
    fn normalize(self, now: DateTime<Utc>) -> AppResult<Self> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title is too long (max {MAX_TITLE_LEN} chars)"
            )));
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(AppError::Validation(format!(
                "Description is too long (max {MAX_DESCRIPTION_LEN} chars)"
            )));
        }

        if self.options.len() < MIN_OPTIONS || self.options.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll must have between {MIN_OPTIONS} and {MAX_OPTIONS} options"
            )));
        }
        let mut options = Vec::with_capacity(self.options.len());
        for option in self.options {
            let option = option.trim().to_string();
            if option.is_empty() {
                return Err(AppError::Validation(
                    "Poll options cannot be empty".to_string(),
                ));
            }
            if option.chars().count() > MAX_OPTION_LEN {
                return Err(AppError::Validation(format!(
                    "Poll option is too long (max {MAX_OPTION_LEN} chars)"
                )));
            }
            options.push(option);
        }

        if self.end_date.is_some_and(|end| end <= now) {
            return Err(AppError::Validation(
                "End date must be in the future".to_string(),
            ));
        }

        Ok(Self {
            title,
            description,
            options,
            end_date: self.end_date,
        })
    }
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(ledger: VoteLedger) -> Self {
        Self {
            ledger,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a poll owned by `creator`.
    pub async fn create(&self, creator: &VoterId, input: CreatePollInput) -> AppResult<Poll> {
        let now = Utc::now();
        let input = input.normalize(now)?;

        let option_ids = self.id_gen.generate_many(input.options.len());
        let poll = Poll::new(
            self.id_gen.generate(),
            input.title,
            input.description,
            creator.as_str().to_string(),
            option_ids.into_iter().zip(input.options).collect(),
            input.end_date,
            now,
        );

        self.ledger.store().insert(&poll).await?;
        tracing::info!(poll_id = %poll.id(), creator = %creator, "Poll created");
        Ok(poll)
    }

    /// Get a poll by ID.
    pub async fn get(&self, poll_id: &str) -> AppResult<Poll> {
        let mut poll = self
            .ledger
            .store()
            .load(poll_id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;
        poll.settle(Utc::now());
        Ok(poll)
    }

    /// Polls whose stored flag is active, newest first.
    pub async fn list_active(&self) -> AppResult<Vec<Poll>> {
        self.list(PollQuery::Active).await
    }

    /// Active polls that are not past their end date, newest first.
    pub async fn list_open(&self) -> AppResult<Vec<Poll>> {
        self.list(PollQuery::Open(Utc::now())).await
    }

    /// Polls created by a user.
    pub async fn list_created_by(&self, user: &VoterId) -> AppResult<Vec<Poll>> {
        self.list(PollQuery::CreatedBy(user.as_str().to_string()))
            .await
    }

    /// Polls a user has voted on.
    pub async fn list_voted_by(&self, user: &VoterId) -> AppResult<Vec<Poll>> {
        self.list(PollQuery::VotedBy(user.clone())).await
    }

    /// How many polls a user created and voted on, and the votes their polls drew.
    pub async fn stats(&self, user: &VoterId) -> AppResult<UserPollStats> {
        let created = self
            .ledger
            .store()
            .list(PollQuery::CreatedBy(user.as_str().to_string()))
            .await?;
        let voted = self
            .ledger
            .store()
            .list(PollQuery::VotedBy(user.clone()))
            .await?;

        Ok(UserPollStats {
            polls_created: created.len(),
            polls_voted: voted.len(),
            total_votes_received: created.iter().map(|p| u64::from(p.total_votes())).sum(),
        })
    }

    /// End a poll. Only its creator may do this.
    pub async fn end(&self, poll_id: &str, requester: &VoterId) -> AppResult<Poll> {
        self.ledger.end_poll(poll_id, requester.as_str()).await
    }

    async fn list(&self, query: PollQuery) -> AppResult<Vec<Poll>> {
        let now = Utc::now();
        let mut polls = self.ledger.store().list(query).await?;
        for poll in &mut polls {
            poll.settle(now);
        }
        Ok(polls)
    }
}
