//! User, relationship and list models

use serde::{Deserialize, Serialize};

/// A remote user, as embedded in statuses and messages
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Remote user id
    pub id: i64,
    /// Handle without the leading `@` (e.g. `alice` or `alice@example.social`)
    pub screen_name: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Whether follow requests need approval
    pub is_protected: bool,
}

impl User {
    /// Create a user with the minimum known fields
    pub fn new(id: i64, screen_name: &str) -> Self {
        Self {
            id,
            screen_name: screen_name.to_string(),
            name: screen_name.to_string(),
            avatar_url: None,
            is_protected: false,
        }
    }

    /// Name for messages: display name when present, handle otherwise
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.screen_name
        } else {
            &self.name
        }
    }
}

/// Relationship between the account owner (source) and another user (target)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relationship {
    /// Target user id
    pub user_id: i64,
    /// Source follows target
    pub following: bool,
    /// Target follows source
    pub followed_by: bool,
    /// Source blocks target
    pub blocking: bool,
    /// Target blocks source
    pub blocked_by: bool,
    /// Source mutes target
    pub muting: bool,
    /// Source sees target's retweets
    pub retweet_enabled: bool,
    /// Source receives notifications for target's posts
    pub notifications_enabled: bool,
    /// Source may send a direct message to target
    pub can_dm: bool,
    /// A follow request is pending
    pub requested: bool,
}

/// A user list (only the fields membership changes report back)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserList {
    /// Remote list id
    pub id: i64,
    /// List name
    pub name: String,
}
