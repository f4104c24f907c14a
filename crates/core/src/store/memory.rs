//! In-process poll store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use livepoll_common::{AppError, AppResult};
use tokio::sync::RwLock;

use super::{PollQuery, PollStore};
use crate::models::{Poll, VoteEntry};

/// Poll store backed by a map, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryPollStore {
    polls: Arc<RwLock<HashMap<String, Poll>>>,
}

impl MemoryPollStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn load(&self, poll_id: &str) -> AppResult<Option<Poll>> {
        Ok(self.polls.read().await.get(poll_id).cloned())
    }

    async fn insert(&self, poll: &Poll) -> AppResult<()> {
        let mut polls = self.polls.write().await;
        if polls.contains_key(poll.id()) {
            return Err(AppError::Database(format!(
                "duplicate poll id {}",
                poll.id()
            )));
        }
        polls.insert(poll.id().to_string(), poll.clone());
        Ok(())
    }

    async fn save(&self, poll: &Poll) -> AppResult<()> {
        let mut polls = self.polls.write().await;
        match polls.get_mut(poll.id()) {
            Some(stored) => {
                *stored = poll.clone();
                Ok(())
            }
            None => Err(AppError::PollNotFound(poll.id().to_string())),
        }
    }

    async fn record_vote(&self, poll: &Poll, entry: &VoteEntry) -> AppResult<()> {
        let mut polls = self.polls.write().await;
        let Some(stored) = polls.get_mut(poll.id()) else {
            return Err(AppError::PollNotFound(poll.id().to_string()));
        };
        if stored.has_voted(&entry.voter_id) {
            return Err(AppError::Database(format!(
                "duplicate ledger entry for {} on {}",
                entry.voter_id, entry.poll_id
            )));
        }
        *stored = poll.clone();
        Ok(())
    }

    async fn list(&self, query: PollQuery) -> AppResult<Vec<Poll>> {
        let polls = self.polls.read().await;
        let mut matched: Vec<Poll> = polls
            .values()
            .filter(|poll| match &query {
                PollQuery::Active => poll.is_active(),
                PollQuery::Open(now) => poll.is_active() && !poll.is_past_deadline(*now),
                PollQuery::CreatedBy(user) => poll.creator() == user,
                PollQuery::VotedBy(voter) => poll.has_voted(voter),
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(matched)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::VoterId;
    use chrono::{Duration, Utc};

    fn poll(id: &str, creator: &str, age_minutes: i64) -> Poll {
        Poll::new(
            id.to_string(),
            format!("Poll {id}"),
            None,
            creator.to_string(),
            vec![
                ("a".to_string(), "A".to_string()),
                ("b".to_string(), "B".to_string()),
            ],
            None,
            Utc::now() - Duration::minutes(age_minutes),
        )
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", "alice", 0)).await.unwrap();

        assert!(store.load("p1").await.unwrap().is_some());
        assert!(store.load("missing").await.unwrap().is_none());
        assert!(store.insert(&poll("p1", "alice", 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_record_vote_rejects_duplicate_ledger_entry() {
        let store = MemoryPollStore::new();
        let mut p = poll("p1", "alice", 0);
        store.insert(&p).await.unwrap();

        let voter = VoterId::new("bob");
        let entry = p.apply_vote(&voter, "a", Utc::now()).unwrap();
        store.record_vote(&p, &entry).await.unwrap();

        let err = store.record_vote(&p, &entry).await.unwrap_err();
        assert!(err.is_retryable());
        let stored = store.load("p1").await.unwrap().unwrap();
        assert_eq!(stored.total_votes(), 1);
    }

    #[tokio::test]
    async fn test_list_queries_newest_first() {
        let store = MemoryPollStore::new();
        store.insert(&poll("old", "alice", 30)).await.unwrap();
        store.insert(&poll("new", "bob", 1)).await.unwrap();
        let mut ended = poll("ended", "alice", 10);
        ended.end(Utc::now());
        store.insert(&ended).await.unwrap();

        let active: Vec<_> = store
            .list(PollQuery::Active)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(active, vec!["new", "old"]);

        let alice: Vec<_> = store
            .list(PollQuery::CreatedBy("alice".to_string()))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(alice, vec!["ended", "old"]);
    }

    #[tokio::test]
    async fn test_list_voted_by() {
        let store = MemoryPollStore::new();
        let mut p = poll("p1", "alice", 0);
        store.insert(&p).await.unwrap();
        store.insert(&poll("p2", "alice", 0)).await.unwrap();

        let voter = VoterId::new("carol");
        let entry = p.apply_vote(&voter, "b", Utc::now()).unwrap();
        store.record_vote(&p, &entry).await.unwrap();

        let voted = store.list(PollQuery::VotedBy(voter)).await.unwrap();
        assert_eq!(voted.len(), 1);
        assert_eq!(voted[0].id(), "p1");
    }
}
