//! Draft model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An unsent status draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Unique identifier
    pub id: Uuid,
    /// Text to post
    pub text: String,
    /// Accounts to post from
    pub account_ids: Vec<i64>,
    /// Status being replied to
    pub in_reply_to_status_id: Option<i64>,
    /// When the draft was created
    pub created_at: DateTime<Utc>,
    /// When the draft was last edited
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Create a new draft
    pub fn new(text: &str, account_ids: Vec<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            account_ids,
            in_reply_to_status_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Account ids as stored in the database (comma-separated)
    pub fn account_ids_str(&self) -> String {
        self.account_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse account ids from the stored string
    pub fn account_ids_from_str(s: &str) -> Vec<i64> {
        s.split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_ids_str_skips_garbage() {
        let draft = Draft::new("hello", vec![3, 14]);
        assert_eq!(draft.account_ids_str(), "3,14");
        assert_eq!(Draft::account_ids_from_str("3, x,14,"), vec![3, 14]);
    }
}
