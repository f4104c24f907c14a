//! Vote ledger.
//!
//! Every mutation of a poll runs inside that poll's serialization section:
//! load, check, apply, persist, broadcast. Holding the section through the
//! broadcast gives each room a single total order of snapshots, and taking
//! the catch-up snapshot inside the section means a new subscriber can never
//! see a tally older than a vote that completed before it joined.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use livepoll_common::{AppError, AppResult};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::broadcast::BroadcastDispatcher;
use super::room::{Observer, RoomRegistry};
use crate::error::VoteError;
use crate::models::{Poll, VoterId};
use crate::store::PollStoreService;

struct LockTable {
    sections: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl LockTable {
    fn prune(&self, poll_id: &str) {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        if sections
            .get(poll_id)
            .is_some_and(|section| Arc::strong_count(section) == 1)
        {
            sections.remove(poll_id);
        }
    }
}

/// Per-poll async locks, created on demand and pruned when unused.
#[derive(Clone)]
pub struct PollLocks {
    table: Arc<LockTable>,
}

impl PollLocks {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(LockTable {
                sections: Mutex::new(HashMap::new()),
                timeout,
            }),
        }
    }

    /// Enter a poll's section, waiting at most the configured timeout.
    pub async fn acquire(&self, poll_id: &str) -> Result<PollSection, VoteError> {
        let section = {
            let mut sections = self
                .table
                .sections
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(sections.entry(poll_id.to_string()).or_default())
        };

        match tokio::time::timeout(self.table.timeout, section.lock_owned()).await {
            Ok(guard) => Ok(PollSection {
                guard: Some(guard),
                poll_id: poll_id.to_string(),
                table: Arc::clone(&self.table),
            }),
            Err(_) => {
                self.table.prune(poll_id);
                tracing::warn!(
                    poll_id = %poll_id,
                    timeout = ?self.table.timeout,
                    "Timed out waiting for poll section"
                );
                Err(VoteError::Transient(format!(
                    "timed out waiting for poll {poll_id}"
                )))
            }
        }
    }

    /// Number of polls with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held for the duration of a poll mutation. Releasing it prunes the lock
/// entry when nobody else holds or awaits it.
pub struct PollSection {
    guard: Option<OwnedMutexGuard<()>>,
    poll_id: String,
    table: Arc<LockTable>,
}

impl Drop for PollSection {
    fn drop(&mut self) {
        // The guard owns a reference to the mutex; release it before counting.
        drop(self.guard.take());
        self.table.prune(&self.poll_id);
    }
}

/// Serialized vote and lifecycle operations over a [`PollStoreService`].
#[derive(Clone)]
pub struct VoteLedger {
    store: PollStoreService,
    locks: PollLocks,
    dispatcher: BroadcastDispatcher,
}

impl VoteLedger {
    #[must_use]
    pub fn new(store: PollStoreService, rooms: RoomRegistry, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: PollLocks::new(lock_timeout),
            dispatcher: BroadcastDispatcher::new(rooms),
        }
    }

    #[must_use]
    pub const fn rooms(&self) -> &RoomRegistry {
        self.dispatcher.rooms()
    }

    #[must_use]
    pub const fn store(&self) -> &PollStoreService {
        &self.store
    }

    #[must_use]
    pub const fn locks(&self) -> &PollLocks {
        &self.locks
    }

    /// Cast one vote and broadcast the resulting snapshot to the poll's room.
    pub async fn cast_vote(
        &self,
        voter: &VoterId,
        poll_id: &str,
        option_id: &str,
    ) -> Result<Poll, VoteError> {
        let _section = self.locks.acquire(poll_id).await?;
        let now = Utc::now();

        let mut poll = self
            .store
            .load(poll_id)
            .await
            .map_err(|e| VoteError::storage(&e))?
            .ok_or_else(|| VoteError::NotFound(poll_id.to_string()))?;
        poll.settle(now);

        let entry = poll.apply_vote(voter, option_id, now)?;
        self.store.record_vote(&poll, &entry).await.map_err(|e| {
            tracing::warn!(
                poll_id = %poll_id,
                voter_id = %voter,
                error = %e,
                "Failed to persist vote"
            );
            VoteError::storage(&e)
        })?;

        tracing::info!(
            poll_id = %poll_id,
            voter_id = %voter,
            option_id = %option_id,
            total_votes = poll.total_votes(),
            "Vote recorded"
        );
        self.dispatcher.publish(&poll);
        Ok(poll)
    }

    /// Join the poll's room and push the current snapshot to this observer.
    ///
    /// An unknown poll still joins the room but gets no catch-up.
    pub async fn subscribe(
        &self,
        poll_id: &str,
        observer: &Observer,
    ) -> Result<Option<Poll>, VoteError> {
        let _section = self.locks.acquire(poll_id).await?;

        let poll = self
            .store
            .load(poll_id)
            .await
            .map_err(|e| VoteError::storage(&e))?;
        self.rooms().join(poll_id, observer);

        let Some(mut poll) = poll else {
            tracing::debug!(poll_id = %poll_id, observer = %observer.id(), "Joined room of unknown poll");
            return Ok(None);
        };
        poll.settle(Utc::now());

        if !observer.send(Arc::new(poll.clone())) {
            self.rooms().disconnect(observer.id());
        }
        Ok(Some(poll))
    }

    /// Leave the poll's room. A no-op when the observer is not a member.
    pub fn unsubscribe(&self, poll_id: &str, observer: &Observer) -> bool {
        self.rooms().leave(poll_id, observer.id())
    }

    /// Close a poll on behalf of its creator and broadcast the closed snapshot.
    pub async fn end_poll(&self, poll_id: &str, requester: &str) -> AppResult<Poll> {
        let _section = self.locks.acquire(poll_id).await?;
        let now = Utc::now();

        let mut poll = self
            .store
            .load(poll_id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;

        if poll.creator() != requester {
            return Err(AppError::Forbidden(
                "Only the poll creator can end this poll".to_string(),
            ));
        }

        if poll.end(now) {
            self.store.save(&poll).await?;
            tracing::info!(poll_id = %poll_id, "Poll ended");
            self.dispatcher.publish(&poll);
        }
        poll.settle(now);
        Ok(poll)
    }
}
