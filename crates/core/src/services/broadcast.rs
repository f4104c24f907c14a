//! Room fan-out.

use std::sync::Arc;

use super::room::{PollSnapshot, RoomRegistry};
use crate::models::Poll;

/// Pushes a poll snapshot to every member of the poll's room.
///
/// A member whose queue is closed is dropped from all rooms; delivery to the
/// remaining members is unaffected.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    rooms: RoomRegistry,
}

impl BroadcastDispatcher {
    #[must_use]
    pub const fn new(rooms: RoomRegistry) -> Self {
        Self { rooms }
    }

    #[must_use]
    pub const fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Send `poll` to its room. Returns the number of members reached.
    pub fn publish(&self, poll: &Poll) -> usize {
        let snapshot: PollSnapshot = Arc::new(poll.clone());
        let members = self.rooms.members(poll.id());

        let mut delivered = 0;
        for observer in members {
            if observer.send(Arc::clone(&snapshot)) {
                delivered += 1;
            } else {
                tracing::warn!(
                    poll_id = %poll.id(),
                    observer = %observer.id(),
                    "Dropping observer with closed queue"
                );
                self.rooms.disconnect(observer.id());
            }
        }

        tracing::debug!(poll_id = %poll.id(), delivered, "Broadcast poll snapshot");
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::room::Observer;
    use chrono::Utc;

    fn poll(id: &str) -> Poll {
        Poll::new(
            id.to_string(),
            "t".to_string(),
            None,
            "c".to_string(),
            vec![
                ("a".to_string(), "A".to_string()),
                ("b".to_string(), "B".to_string()),
            ],
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_every_member_gets_the_same_snapshot() {
        let rooms = RoomRegistry::new();
        let dispatcher = BroadcastDispatcher::new(rooms.clone());
        let (a, mut rx_a) = Observer::channel();
        let (b, mut rx_b) = Observer::channel();
        rooms.join("p1", &a);
        rooms.join("p1", &b);

        assert_eq!(dispatcher.publish(&poll("p1")), 2);

        let got_a = rx_a.recv().await.unwrap();
        let got_b = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&got_a, &got_b));
    }

    #[tokio::test]
    async fn test_other_rooms_not_notified() {
        let rooms = RoomRegistry::new();
        let dispatcher = BroadcastDispatcher::new(rooms.clone());
        let (a, mut rx_a) = Observer::channel();
        rooms.join("p2", &a);

        assert_eq!(dispatcher.publish(&poll("p1")), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_observer_does_not_block_others() {
        let rooms = RoomRegistry::new();
        let dispatcher = BroadcastDispatcher::new(rooms.clone());
        let (dead, rx_dead) = Observer::channel();
        let (live, mut rx_live) = Observer::channel();
        rooms.join("p1", &dead);
        rooms.join("p2", &dead);
        rooms.join("p1", &live);
        drop(rx_dead);

        assert_eq!(dispatcher.publish(&poll("p1")), 1);

        assert!(rx_live.recv().await.is_some());
        assert!(!rooms.is_member("p1", dead.id()));
        assert!(!rooms.is_member("p2", dead.id()));
    }
}
