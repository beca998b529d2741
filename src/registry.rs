//! Topic registry: the authoritative set of subscribed logical channels.
//!
//! The registry tracks subscription *intent* independently of connection
//! state — subscribing while disconnected is legal and simply records the
//! topic. On every transition into `Connected` the session replays the full
//! set against the new connection, because messages broadcast during an
//! outage are lost (delivery is at-most-once per connection).

use std::collections::HashSet;
use std::fmt;

use crate::protocol::{RoomId, UserId};

/// A logical broadcast channel within the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Shared room-directory diff channel.
    RoomDirectory,
    /// Full room-list snapshot channel for late joiners.
    RoomListSnapshots,
    /// Global plaza chat.
    GlobalChat,
    /// Avatar position broadcasts.
    Positions,
    /// Membership and phase detail for one room.
    RoomDetail(RoomId),
    /// Chat scoped to one room.
    RoomChat(RoomId),
    /// Game events scoped to one room.
    RoomGame(RoomId),
    /// Join-result acknowledgments addressed to one user.
    JoinResults(UserId),
    /// Game invitations addressed to one user.
    Invites(UserId),
}

impl Topic {
    /// Wire name of the channel this topic maps to.
    pub fn channel_name(&self) -> String {
        match self {
            Self::RoomDirectory => "rooms".into(),
            Self::RoomListSnapshots => "rooms-list".into(),
            Self::GlobalChat => "chat".into(),
            Self::Positions => "positions".into(),
            Self::RoomDetail(room_id) => format!("room/{room_id}"),
            Self::RoomChat(room_id) => format!("room/{room_id}/chat"),
            Self::RoomGame(room_id) => format!("room/{room_id}/game"),
            Self::JoinResults(user_id) => format!("user/{user_id}/join-result"),
            Self::Invites(user_id) => format!("user/{user_id}/invite"),
        }
    }

    /// The three room-scoped topics opened while a room is active.
    pub fn for_room(room_id: RoomId) -> [Topic; 3] {
        [
            Self::RoomDetail(room_id),
            Self::RoomChat(room_id),
            Self::RoomGame(room_id),
        ]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel_name())
    }
}

/// Tracks which topics the session intends to be subscribed to.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashSet<Topic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Returns `true` if the topic was newly added
    /// (a wire subscribe should be issued), `false` if it was already
    /// registered.
    pub fn subscribe(&mut self, topic: Topic) -> bool {
        self.topics.insert(topic)
    }

    /// Remove a subscription. Unsubscribing twice, or unsubscribing a topic
    /// never subscribed, is a silent no-op; returns `true` only when a wire
    /// unsubscribe should be issued.
    pub fn unsubscribe(&mut self, topic: Topic) -> bool {
        self.topics.remove(&topic)
    }

    /// Whether a topic is currently registered.
    pub fn contains(&self, topic: Topic) -> bool {
        self.topics.contains(&topic)
    }

    /// Every currently registered topic, for replay after (re)connect.
    pub fn all(&self) -> Vec<Topic> {
        self.topics.iter().copied().collect()
    }

    /// Drop the room-scoped topics for `room_id`, returning the ones that
    /// were actually registered.
    pub fn remove_room(&mut self, room_id: RoomId) -> Vec<Topic> {
        Topic::for_room(room_id)
            .into_iter()
            .filter(|t| self.topics.remove(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn subscribe_is_idempotent() {
        let mut registry = TopicRegistry::new();
        assert!(registry.subscribe(Topic::RoomDirectory));
        assert!(!registry.subscribe(Topic::RoomDirectory));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unsubscribe_unknown_topic_is_a_no_op() {
        let mut registry = TopicRegistry::new();
        assert!(!registry.unsubscribe(Topic::GlobalChat));

        registry.subscribe(Topic::GlobalChat);
        assert!(registry.unsubscribe(Topic::GlobalChat));
        assert!(!registry.unsubscribe(Topic::GlobalChat));
    }

    #[test]
    fn room_topics_are_tracked_and_removed_together() {
        let mut registry = TopicRegistry::new();
        let room_id = Uuid::from_u128(7);

        for topic in Topic::for_room(room_id) {
            registry.subscribe(topic);
        }
        registry.subscribe(Topic::RoomDirectory);
        assert_eq!(registry.len(), 4);

        let removed = registry.remove_room(room_id);
        assert_eq!(removed.len(), 3);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(Topic::RoomDirectory));
    }

    #[test]
    fn channel_names_embed_scope_ids() {
        let room_id = Uuid::from_u128(0xAB);
        let user_id = Uuid::from_u128(0xCD);

        assert_eq!(Topic::RoomDirectory.channel_name(), "rooms");
        assert_eq!(
            Topic::RoomChat(room_id).channel_name(),
            format!("room/{room_id}/chat")
        );
        assert_eq!(
            Topic::JoinResults(user_id).channel_name(),
            format!("user/{user_id}/join-result")
        );
    }

    #[test]
    fn all_returns_the_exact_registered_set() {
        let mut registry = TopicRegistry::new();
        registry.subscribe(Topic::RoomDirectory);
        registry.subscribe(Topic::Positions);
        registry.subscribe(Topic::Positions); // duplicate

        let mut names: Vec<String> =
            registry.all().iter().map(Topic::channel_name).collect();
        names.sort();
        assert_eq!(names, vec!["positions", "rooms"]);
    }
}
