//! Poll rooms.
//!
//! A room is the set of observers currently watching one poll. Rooms are
//! created on first join and dropped when their last member leaves.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::models::Poll;

/// Immutable snapshot shared by every member of a room.
pub type PollSnapshot = Arc<Poll>;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique observer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{}", self.0)
    }
}

/// Sending half of a connection's snapshot queue.
///
/// The queue is unbounded so a slow reader never causes a snapshot to be
/// skipped; it only delays that reader.
#[derive(Debug, Clone)]
pub struct Observer {
    id: ObserverId,
    tx: mpsc::UnboundedSender<PollSnapshot>,
}

impl Observer {
    /// Create an observer and the receiver its connection drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PollSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        (Self { id, tx }, rx)
    }

    #[must_use]
    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Queue a snapshot. Returns `false` if the connection is gone.
    pub fn send(&self, snapshot: PollSnapshot) -> bool {
        self.tx.send(snapshot).is_ok()
    }
}

#[derive(Default)]
struct Rooms {
    by_poll: HashMap<String, HashMap<ObserverId, Observer>>,
    by_observer: HashMap<ObserverId, HashSet<String>>,
}

impl Rooms {
    fn remove(&mut self, poll_id: &str, observer_id: ObserverId) -> bool {
        let removed = match self.by_poll.get_mut(poll_id) {
            Some(members) => {
                let removed = members.remove(&observer_id).is_some();
                if members.is_empty() {
                    self.by_poll.remove(poll_id);
                }
                removed
            }
            None => false,
        };

        if let Some(polls) = self.by_observer.get_mut(&observer_id) {
            polls.remove(poll_id);
            if polls.is_empty() {
                self.by_observer.remove(&observer_id);
            }
        }
        removed
    }
}

/// Registry of poll rooms, indexed both ways so a disconnect is cheap.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Rooms>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to a poll's room. Returns `false` if it was already a member.
    pub fn join(&self, poll_id: &str, observer: &Observer) -> bool {
        let mut rooms = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let added = rooms
            .by_poll
            .entry(poll_id.to_string())
            .or_default()
            .insert(observer.id(), observer.clone())
            .is_none();
        rooms
            .by_observer
            .entry(observer.id())
            .or_default()
            .insert(poll_id.to_string());

        if added {
            tracing::debug!(poll_id = %poll_id, observer = %observer.id(), "Observer joined room");
        }
        added
    }

    /// Remove an observer from one room. Returns `false` if it was not a member.
    pub fn leave(&self, poll_id: &str, observer_id: ObserverId) -> bool {
        let mut rooms = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = rooms.remove(poll_id, observer_id);
        if removed {
            tracing::debug!(poll_id = %poll_id, observer = %observer_id, "Observer left room");
        }
        removed
    }

    /// Remove an observer from every room. Returns how many rooms it left.
    pub fn disconnect(&self, observer_id: ObserverId) -> usize {
        let mut rooms = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(polls) = rooms.by_observer.remove(&observer_id) else {
            return 0;
        };

        let mut left = 0;
        for poll_id in &polls {
            if rooms.remove(poll_id, observer_id) {
                left += 1;
            }
        }
        tracing::debug!(observer = %observer_id, rooms = left, "Observer disconnected");
        left
    }

    /// Current members of a poll's room.
    #[must_use]
    pub fn members(&self, poll_id: &str) -> Vec<Observer> {
        let rooms = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .by_poll
            .get(poll_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_member(&self, poll_id: &str, observer_id: ObserverId) -> bool {
        let rooms = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .by_poll
            .get(poll_id)
            .is_some_and(|members| members.contains_key(&observer_id))
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_poll
            .len()
    }
}
