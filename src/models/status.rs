//! Status model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Item, User};

/// A user mentioned in a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMention {
    /// Remote user id
    pub id: i64,
    /// Mentioned handle
    pub screen_name: String,
}

/// A status as stored for one account.
///
/// A retweet is stored under its own id with `retweet_id` pointing at the
/// original, so the same original may appear both as itself and embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Remote status id
    pub id: i64,
    /// Account this row belongs to (0 until assigned by a fetch)
    pub account_id: i64,
    /// Author (of the original when this is a retweet)
    pub user: User,
    /// Plain text content
    pub text: String,
    /// Original HTML content
    pub text_html: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Web URL
    pub url: Option<String>,
    /// Id of the original status when this is a retweet
    pub retweet_id: Option<i64>,
    /// Who retweeted it, when this is a retweet
    pub retweeted_by: Option<User>,
    /// Id of the account owner's own retweet of this status
    pub my_retweet_id: Option<i64>,
    /// Favorited by the account owner
    pub is_favorite: bool,
    /// "Load more" marker: older data may be missing below this row
    pub is_gap: bool,
    /// Favorite count
    pub favorite_count: u32,
    /// Retweet count
    pub retweet_count: u32,
    /// Reply count
    pub reply_count: u32,
    /// Status this one replies to
    pub in_reply_to_status_id: Option<i64>,
    /// Mentioned users
    pub mentions: Vec<UserMention>,
    /// Id of the timeline entry that carried this status, when the source
    /// pages by something other than status ids (notifications)
    pub paging_id: Option<i64>,
}

impl Status {
    /// Create a status with just an id and author
    pub fn new(id: i64, user: User) -> Self {
        Self {
            id,
            account_id: 0,
            user,
            text: String::new(),
            text_html: None,
            created_at: Utc::now(),
            url: None,
            retweet_id: None,
            retweeted_by: None,
            my_retweet_id: None,
            is_favorite: false,
            is_gap: false,
            favorite_count: 0,
            retweet_count: 0,
            reply_count: 0,
            in_reply_to_status_id: None,
            mentions: Vec::new(),
            paging_id: None,
        }
    }

    /// Whether this row is a retweet of another status
    pub const fn is_retweet(&self) -> bool {
        self.retweet_id.is_some()
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.created_at);

        if duration.num_seconds() < 60 {
            format!("{}s", duration.num_seconds().max(0))
        } else if duration.num_minutes() < 60 {
            format!("{}m", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h", duration.num_hours())
        } else if duration.num_days() < 7 {
            format!("{}d", duration.num_days())
        } else {
            self.created_at.format("%b %d").to_string()
        }
    }
}

impl Item for Status {
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
