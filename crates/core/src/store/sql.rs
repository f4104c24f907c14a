//! Poll store backed by the sea-orm repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use livepoll_common::{AppError, AppResult, IdGenerator};
use livepoll_db::{
    entities::{poll, poll_vote},
    repositories::{PollRepository, PollVoteRepository},
};
use sea_orm::{ActiveValue, Set};

use super::{PollQuery, PollStore};
use crate::models::{Poll, PollOption, StoredPoll, VoteEntry, VoterId};

/// Durable poll store. The poll row holds the tallies; the `poll_vote` table is
/// the ledger and the source of the voter set.
#[derive(Clone)]
pub struct SqlPollStore {
    poll_repo: PollRepository,
    vote_repo: PollVoteRepository,
    id_gen: IdGenerator,
}

impl SqlPollStore {
    /// Create a new store over the given repositories.
    #[must_use]
    pub const fn new(poll_repo: PollRepository, vote_repo: PollVoteRepository) -> Self {
        Self {
            poll_repo,
            vote_repo,
            id_gen: IdGenerator::new(),
        }
    }

    async fn hydrate(&self, models: Vec<poll::Model>) -> AppResult<Vec<Poll>> {
        let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
        let mut voters: HashMap<String, Vec<VoterId>> = HashMap::new();
        for vote in self.vote_repo.find_by_polls(ids).await? {
            voters
                .entry(vote.poll_id)
                .or_default()
                .push(VoterId::from(vote.voter_id));
        }

        models
            .into_iter()
            .map(|model| {
                let poll_voters = voters.remove(&model.id).unwrap_or_default();
                to_poll(model, poll_voters)
            })
            .collect()
    }
}

fn to_poll(model: poll::Model, voters: Vec<VoterId>) -> AppResult<Poll> {
    let options: Vec<PollOption> = serde_json::from_value(model.options)
        .map_err(|e| AppError::Internal(format!("Invalid poll options: {e}")))?;

    Ok(Poll::restore(StoredPoll {
        id: model.id,
        title: model.title,
        description: model.description,
        creator: model.creator_id,
        options,
        voters,
        is_active: model.is_active,
        end_date: model.end_date.map(|d| d.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }))
}

fn voters_count(poll: &Poll) -> i32 {
    i32::try_from(poll.voters().len()).unwrap_or(i32::MAX)
}

/// Columns that change after creation.
fn mutable_columns(poll: &Poll) -> AppResult<poll::ActiveModel> {
    Ok(poll::ActiveModel {
        id: ActiveValue::Unchanged(poll.id().to_string()),
        options: Set(serde_json::to_value(poll.options())?),
        is_active: Set(poll.is_active()),
        end_date: Set(poll.end_date().map(Into::into)),
        voters_count: Set(voters_count(poll)),
        updated_at: Set(poll.updated_at().into()),
        ..Default::default()
    })
}

#[async_trait]
impl PollStore for SqlPollStore {
    async fn load(&self, poll_id: &str) -> AppResult<Option<Poll>> {
        let Some(model) = self.poll_repo.find_by_id(poll_id).await? else {
            return Ok(None);
        };
        let voters = self
            .vote_repo
            .find_by_poll(poll_id)
            .await?
            .into_iter()
            .map(|v| VoterId::from(v.voter_id))
            .collect();
        to_poll(model, voters).map(Some)
    }

    async fn insert(&self, poll: &Poll) -> AppResult<()> {
        let model = poll::ActiveModel {
            id: Set(poll.id().to_string()),
            title: Set(poll.title().to_string()),
            description: Set(poll.description().map(ToString::to_string)),
            creator_id: Set(poll.creator().to_string()),
            options: Set(serde_json::to_value(poll.options())?),
            is_active: Set(poll.is_active()),
            end_date: Set(poll.end_date().map(Into::into)),
            voters_count: Set(voters_count(poll)),
            created_at: Set(poll.created_at().into()),
            updated_at: Set(poll.updated_at().into()),
        };
        self.poll_repo.create(model).await?;
        Ok(())
    }

    async fn save(&self, poll: &Poll) -> AppResult<()> {
        self.poll_repo.update(mutable_columns(poll)?).await?;
        Ok(())
    }

    async fn record_vote(&self, poll: &Poll, entry: &VoteEntry) -> AppResult<()> {
        let vote = poll_vote::ActiveModel {
            id: Set(self.id_gen.generate()),
            poll_id: Set(entry.poll_id.clone()),
            voter_id: Set(entry.voter_id.as_str().to_string()),
            option_id: Set(entry.option_id.clone()),
            created_at: Set(entry.cast_at.into()),
        };
        self.poll_repo
            .record_vote(mutable_columns(poll)?, vote)
            .await?;
        Ok(())
    }

    async fn list(&self, query: PollQuery) -> AppResult<Vec<Poll>> {
        let models = match query {
            PollQuery::Active => self.poll_repo.find_active().await?,
            PollQuery::Open(now) => self.poll_repo.find_open(now).await?,
            PollQuery::CreatedBy(user) => self.poll_repo.find_by_creator(&user).await?,
            PollQuery::VotedBy(voter) => {
                let ids = self
                    .vote_repo
                    .find_poll_ids_by_voter(voter.as_str())
                    .await?;
                self.poll_repo.find_by_ids(ids).await?
            }
        };
        self.hydrate(models).await
    }
}
