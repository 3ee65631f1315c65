//! Per-user room registry: a `broadcast::Sender<Event>` per connected
//! user, created lazily on first subscribe and torn down when the last
//! socket drops. Grounded on
//! `shepherdjerred-monorepo/packages/multiplexer/src/api/ws_events.rs`'s
//! `broadcast::Sender<Event>` room shape, generalized from one global
//! channel to one channel per user.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{Event, EventFabric};

const ROOM_CAPACITY: usize = 256;

struct Room {
    sender: broadcast::Sender<Event>,
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<Uuid, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a user's room, creating it if this is the first
    /// subscriber. The returned receiver sees only events emitted after
    /// this call.
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<Event> {
        let mut rooms = self.rooms.write().unwrap();
        let room = rooms.entry(user_id).or_insert_with(|| {
            let (sender, _) = broadcast::channel(ROOM_CAPACITY);
            Room { sender }
        });
        room.sender.subscribe()
    }

    fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.rooms
            .read()
            .unwrap()
            .get(&user_id)
            .map(|r| r.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop rooms with no subscribers left, so the registry doesn't grow
    /// unboundedly as users connect and disconnect over the process
    /// lifetime.
    pub fn reap_empty_rooms(&self) {
        let mut rooms = self.rooms.write().unwrap();
        rooms.retain(|_, room| room.sender.receiver_count() > 0);
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFabric for RoomRegistry {
    fn emit(&self, user_id: Uuid, event: Event) {
        let rooms = self.rooms.read().unwrap();
        if let Some(room) = rooms.get(&user_id) {
            // send() errors only when there are zero receivers, which is
            // an expected and silent drop per spec §4.H delivery semantics.
            let _ = room.sender.send(event);
        } else {
            tracing::debug!(%user_id, event = event.name(), "no room for user, event dropped");
        }
    }

    fn emit_all(&self, event: Event) {
        let rooms = self.rooms.read().unwrap();
        for room in rooms.values() {
            let _ = room.sender.send(event.clone());
        }
    }

    fn is_online(&self, user_id: Uuid) -> bool {
        self.subscriber_count(user_id) > 0
    }

    fn disconnect(&self, user_id: Uuid) {
        let mut rooms = self.rooms.write().unwrap();
        rooms.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber_is_silent_drop() {
        let registry = RoomRegistry::new();
        registry.emit(
            Uuid::new_v4(),
            Event::UserOnline {
                user_id: Uuid::new_v4(),
            },
        );
        // No panic, no error surfaced: dropped per spec.
    }

    #[tokio::test]
    async fn test_subscribe_then_emit_delivers() {
        let registry = RoomRegistry::new();
        let user_id = Uuid::new_v4();
        let mut rx = registry.subscribe(user_id);

        assert!(registry.is_online(user_id));

        registry.emit(
            user_id,
            Event::GenerationProgress {
                generation_id: Uuid::new_v4(),
                percent: 60,
                stage: "generating".to_string(),
            },
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "generation.progress");
    }

    #[tokio::test]
    async fn test_reap_empty_rooms_removes_unsubscribed() {
        let registry = RoomRegistry::new();
        let user_id = Uuid::new_v4();
        {
            let _rx = registry.subscribe(user_id);
            assert!(registry.is_online(user_id));
        }
        registry.reap_empty_rooms();
        assert!(!registry.is_online(user_id));
    }

    #[test]
    fn test_disconnect_removes_room() {
        let registry = RoomRegistry::new();
        let user_id = Uuid::new_v4();
        let _rx = registry.subscribe(user_id);
        registry.disconnect(user_id);
        assert!(!registry.is_online(user_id));
    }
}
