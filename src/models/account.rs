//! Account model for signed-in users

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed-in account on a Mastodon-compatible server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Local account id (database row id, 0 until inserted)
    pub id: i64,
    /// Remote user id of the account owner
    pub user_id: i64,
    /// Display name (for UI)
    pub display_name: String,
    /// Handle/username (e.g., alice)
    pub handle: String,
    /// Server/instance URL
    pub server: String,
    /// Whether refreshes include this account
    pub is_activated: bool,
    /// Whether this account is used for single-account requests (trends)
    pub is_default: bool,
    /// Avatar URL (cached)
    pub avatar_url: Option<String>,
    /// When the account was added
    pub created_at: DateTime<Utc>,
    /// Last used timestamp
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account, activated and not yet stored
    pub fn new(user_id: i64, handle: &str, server: &str, display_name: &str) -> Self {
        Self {
            id: 0,
            user_id,
            display_name: display_name.to_string(),
            handle: handle.to_string(),
            server: server.to_string(),
            is_activated: true,
            is_default: false,
            avatar_url: None,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Get the full handle with instance
    pub fn full_handle(&self) -> String {
        if self.handle.contains('@') {
            format!("@{}", self.handle.trim_start_matches('@'))
        } else {
            let domain = self
                .server
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            format!("@{}@{}", self.handle, domain)
        }
    }

    /// Key for storing this account's token in the credential file
    pub fn credential_key(&self) -> String {
        format!("roost:account:{}", self.id)
    }
}
