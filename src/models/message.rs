//! Direct message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Item, User};

/// A direct message, stored in the inbox or outbox of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Remote message id
    pub id: i64,
    /// Account this row belongs to
    pub account_id: i64,
    /// Sender
    pub sender: User,
    /// Recipient
    pub recipient: User,
    /// Plain text content
    pub text: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Sent by the account owner
    pub is_outgoing: bool,
    /// Id of the notification that carried this message, if any
    pub paging_id: Option<i64>,
}

impl DirectMessage {
    /// Create a message between two users
    pub fn new(id: i64, sender: User, recipient: User, text: &str) -> Self {
        Self {
            id,
            account_id: 0,
            sender,
            recipient,
            text: text.to_string(),
            created_at: Utc::now(),
            is_outgoing: false,
            paging_id: None,
        }
    }
}

impl Item for DirectMessage {
    fn item_id(&self) -> i64 {
        self.id
    }

    fn paging_id(&self) -> i64 {
        self.paging_id.unwrap_or(self.id)
    }

    fn assign_account(&mut self, account_id: i64) {
        self.account_id = account_id;
    }
}
