//! Typed event channels
//!
//! One broadcast channel per [`EventKind`]. Delivery is FIFO within a kind,
//! unordered across kinds, at most once, and never replayed: a receiver that
//! subscribes late or lags behind misses events.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::Collection;
use crate::models::{DirectMessage, Relationship, Status, UserList};
use crate::sync::MutationError;

const CHANNEL_CAPACITY: usize = 256;

/// Channel an event is delivered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Local store changes
    Store,
    /// User-visible transient messages
    Message,
    /// Status mutations
    Status,
    /// Follow, block, mute and spam mutations
    Friendship,
    /// Direct message mutations
    DirectMessage,
    /// List membership mutations
    UserList,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 6] = [
        Self::Store,
        Self::Message,
        Self::Status,
        Self::Friendship,
        Self::DirectMessage,
        Self::UserList,
    ];
}

/// A user-visible transient message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An action succeeded
    Ok(String),
    /// Informational
    Info(String),
    /// Something failed
    Error(String),
}

/// Remote mutation performed by a mutation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Favorite a status
    CreateFavorite,
    /// Unfavorite a status
    DestroyFavorite,
    /// Retweet a status
    Retweet,
    /// Delete a status or own retweet
    DestroyStatus,
    /// Delete a direct message
    DestroyDirectMessage,
    /// Follow a user
    CreateFriendship,
    /// Unfollow a user
    DestroyFriendship,
    /// Accept a follow request
    AcceptFriendship,
    /// Reject a follow request
    DenyFriendship,
    /// Block a user
    CreateBlock,
    /// Unblock a user
    DestroyBlock,
    /// Mute a user
    CreateMute,
    /// Unmute a user
    DestroyMute,
    /// Report a user for spam
    ReportSpam,
    /// Add users to a list
    AddListMembers,
    /// Remove users from a list
    DeleteListMembers,
}

impl Action {
    /// Short label for messages and logs
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreateFavorite => "favorite",
            Self::DestroyFavorite => "unfavorite",
            Self::Retweet => "retweet",
            Self::DestroyStatus => "delete status",
            Self::DestroyDirectMessage => "delete message",
            Self::CreateFriendship => "follow",
            Self::DestroyFriendship => "unfollow",
            Self::AcceptFriendship => "accept follow request",
            Self::DenyFriendship => "deny follow request",
            Self::CreateBlock => "block",
            Self::DestroyBlock => "unblock",
            Self::CreateMute => "mute",
            Self::DestroyMute => "unmute",
            Self::ReportSpam => "report spam",
            Self::AddListMembers => "add list members",
            Self::DeleteListMembers => "remove list members",
        }
    }

    /// Channel this action's outcome is published on
    pub const fn kind(self) -> EventKind {
        match self {
            Self::CreateFavorite | Self::DestroyFavorite | Self::Retweet | Self::DestroyStatus => {
                EventKind::Status
            }
            Self::DestroyDirectMessage => EventKind::DirectMessage,
            Self::AddListMembers | Self::DeleteListMembers => EventKind::UserList,
            Self::CreateFriendship
            | Self::DestroyFriendship
            | Self::AcceptFriendship
            | Self::DenyFriendship
            | Self::CreateBlock
            | Self::DestroyBlock
            | Self::CreateMute
            | Self::DestroyMute
            | Self::ReportSpam => EventKind::Friendship,
        }
    }
}

/// Something observers may want to react to
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A notifying write touched a collection
    CollectionChanged(Collection),
    /// Transient user-visible message
    Message(Notice),
    FavoriteCreated {
        account_id: i64,
        status: Status,
    },
    FavoriteDestroyed {
        account_id: i64,
        status: Status,
    },
    StatusRetweeted {
        account_id: i64,
        status: Status,
    },
    /// `status` is `None` when the status was already gone remotely
    StatusDestroyed {
        account_id: i64,
        status_id: i64,
        status: Option<Status>,
    },
    /// `message` is `None` when the message was already gone remotely
    MessageDestroyed {
        account_id: i64,
        message_id: i64,
        message: Option<DirectMessage>,
    },
    FriendshipUpdated {
        account_id: i64,
        action: Action,
        relationship: Relationship,
    },
    UsersBlocked {
        account_id: i64,
        user_ids: Vec<i64>,
    },
    UsersReportedForSpam {
        account_id: i64,
        user_ids: Vec<i64>,
    },
    UserListMembersChanged {
        account_id: i64,
        action: Action,
        list: UserList,
        user_ids: Vec<i64>,
    },
    /// Failure variant for every mutation
    MutationFailed {
        action: Action,
        account_id: i64,
        target_id: i64,
        error: MutationError,
    },
}

impl DomainEvent {
    /// Channel this event is delivered on
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::CollectionChanged(_) => EventKind::Store,
            Self::Message(_) => EventKind::Message,
            Self::FavoriteCreated { .. }
            | Self::FavoriteDestroyed { .. }
            | Self::StatusRetweeted { .. }
            | Self::StatusDestroyed { .. } => EventKind::Status,
            Self::MessageDestroyed { .. } => EventKind::DirectMessage,
            Self::FriendshipUpdated { .. }
            | Self::UsersBlocked { .. }
            | Self::UsersReportedForSpam { .. } => EventKind::Friendship,
            Self::UserListMembersChanged { .. } => EventKind::UserList,
            Self::MutationFailed { action, .. } => action.kind(),
        }
    }
}

/// Typed event channels, cheap to clone
#[derive(Debug, Clone)]
pub struct EventBus {
    channels: Arc<HashMap<EventKind, broadcast::Sender<DomainEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with one channel per kind
    pub fn new() -> Self {
        let channels = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, broadcast::channel(CHANNEL_CAPACITY).0))
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Receive events of one kind from now on
    pub fn subscribe(&self, kind: EventKind) -> broadcast::Receiver<DomainEvent> {
        match self.channels.get(&kind) {
            Some(sender) => sender.subscribe(),
            // Every kind gets a channel in new(); keep the receiver valid regardless
            None => broadcast::channel(1).1,
        }
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        if let Some(sender) = self.channels.get(&kind) {
            if sender.send(event).is_err() {
                tracing::trace!(?kind, "event dropped, no subscribers");
            }
        }
    }

    /// Publish a transient message
    pub fn notice(&self, notice: Notice) {
        self.publish(DomainEvent::Message(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    #[tokio::test]
    async fn test_events_are_routed_by_kind() {
        let bus = EventBus::new();
        let mut messages = bus.subscribe(EventKind::Message);
        let mut friendships = bus.subscribe(EventKind::Friendship);

        bus.notice(Notice::Ok("first".to_string()));
        bus.publish(DomainEvent::UsersBlocked {
            account_id: 1,
            user_ids: vec![9],
        });
        bus.notice(Notice::Error("second".to_string()));

        assert_eq!(
            messages.recv().await.unwrap(),
            DomainEvent::Message(Notice::Ok("first".to_string()))
        );
        assert_eq!(
            messages.recv().await.unwrap(),
            DomainEvent::Message(Notice::Error("second".to_string()))
        );
        assert!(matches!(
            friendships.recv().await.unwrap(),
            DomainEvent::UsersBlocked { account_id: 1, .. }
        ));
    }

    #[test]
    fn test_failure_follows_action_kind() {
        let event = DomainEvent::MutationFailed {
            action: Action::DestroyDirectMessage,
            account_id: 1,
            target_id: 2,
            error: MutationError::Remote(ApiError::Transport("reset".to_string())),
        };
        assert_eq!(event.kind(), EventKind::DirectMessage);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.notice(Notice::Info("nobody listens".to_string()));
    }
}
