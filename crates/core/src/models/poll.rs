//! Poll aggregate.
//!
//! A [`Poll`] owns its options, their tallies and the set of voters. The only
//! mutations are [`Poll::apply_vote`] and [`Poll::end`]; both keep
//! `sum(voteCount) == voters.len()`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VoteError;

/// Opaque identity of an authenticated voter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VoterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for VoterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single answer and its tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub vote_count: u32,
}

/// Voting state of a poll at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Open,
    Closed,
}

/// A write-once ledger entry produced by an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEntry {
    pub poll_id: String,
    pub voter_id: VoterId,
    pub option_id: String,
    pub cast_at: DateTime<Utc>,
}

/// Fields needed to hydrate a poll from storage.
#[derive(Debug, Clone)]
pub struct StoredPoll {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub creator: String,
    pub options: Vec<PollOption>,
    pub voters: Vec<VoterId>,
    pub is_active: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The poll aggregate; also the snapshot pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    id: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    creator: String,
    options: Vec<PollOption>,
    voters: Vec<VoterId>,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
    total_votes: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Poll {
    /// A fresh poll with zero tallies. Option IDs and texts are taken as given.
    #[must_use]
    pub fn new(
        id: String,
        title: String,
        description: Option<String>,
        creator: String,
        options: Vec<(String, String)>,
        end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let options = options
            .into_iter()
            .map(|(id, text)| PollOption {
                id,
                text,
                vote_count: 0,
            })
            .collect();

        Self {
            id,
            title,
            description,
            creator,
            options,
            voters: Vec::new(),
            is_active: true,
            end_date,
            total_votes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a poll from its stored form.
    #[must_use]
    pub fn restore(stored: StoredPoll) -> Self {
        let total_votes = stored.options.iter().map(|o| o.vote_count).sum();
        Self {
            id: stored.id,
            title: stored.title,
            description: stored.description,
            creator: stored.creator,
            options: stored.options,
            voters: stored.voters,
            is_active: stored.is_active,
            end_date: stored.end_date,
            total_votes,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn creator(&self) -> &str {
        &self.creator
    }

    #[must_use]
    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    #[must_use]
    pub fn voters(&self) -> &[VoterId] {
        &self.voters
    }

    /// Stored flag; call [`Poll::settle`] first to fold in the deadline.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub const fn total_votes(&self) -> u32 {
        self.total_votes
    }

    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    #[must_use]
    pub fn has_voted(&self, voter: &VoterId) -> bool {
        self.voters.contains(voter)
    }

    /// Whether the deadline, if any, has passed at `now`.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end <= now)
    }

    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> PollState {
        if self.is_active && !self.is_past_deadline(now) {
            PollState::Open
        } else {
            PollState::Closed
        }
    }

    /// Fold an elapsed deadline into the activity flag.
    ///
    /// Closure by date is derived on read instead of by a timer, so every
    /// read path settles before exposing the poll.
    pub fn settle(&mut self, now: DateTime<Utc>) -> &mut Self {
        if self.is_active && self.is_past_deadline(now) {
            self.is_active = false;
        }
        self
    }

    /// Check the vote preconditions that depend on the aggregate, in order:
    /// open, option exists, voter has not voted.
    pub fn check_vote(
        &self,
        voter: &VoterId,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VoteError> {
        if self.state(now) == PollState::Closed {
            return Err(VoteError::PollClosed(self.id.clone()));
        }
        if self.option(option_id).is_none() {
            return Err(VoteError::OptionNotFound {
                poll_id: self.id.clone(),
                option_id: option_id.to_string(),
            });
        }
        if self.has_voted(voter) {
            return Err(VoteError::AlreadyVoted(self.id.clone()));
        }
        Ok(())
    }

    /// Record a vote: append the voter and increment exactly one tally.
    ///
    /// Leaves the aggregate untouched when a precondition fails.
    pub fn apply_vote(
        &mut self,
        voter: &VoterId,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteEntry, VoteError> {
        self.check_vote(voter, option_id, now)?;

        let Some(option) = self.options.iter_mut().find(|o| o.id == option_id) else {
            return Err(VoteError::OptionNotFound {
                poll_id: self.id.clone(),
                option_id: option_id.to_string(),
            });
        };
        option.vote_count += 1;
        self.voters.push(voter.clone());
        self.total_votes += 1;
        self.updated_at = now;

        Ok(VoteEntry {
            poll_id: self.id.clone(),
            voter_id: voter.clone(),
            option_id: option_id.to_string(),
            cast_at: now,
        })
    }

    /// Close the poll. Returns `false` if it was already closed by flag.
    pub fn end(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        if !self.is_past_deadline(now) {
            self.end_date = Some(now);
        }
        self.updated_at = now;
        true
    }

    /// `sum(voteCount) == |voters|` and no voter appears twice.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let sum: u32 = self.options.iter().map(|o| o.vote_count).sum();
        let mut voters: Vec<&VoterId> = self.voters.iter().collect();
        voters.sort_unstable();
        voters.dedup();
        sum == self.total_votes
            && usize::try_from(sum).is_ok_and(|s| s == self.voters.len())
            && voters.len() == self.voters.len()
    }
}
