//! Remote client boundary
//!
//! The sync layer talks to the network only through [`RemoteClient`] and gets
//! clients only through [`ClientResolver`], so a fake client can stand in for
//! the Mastodon one in tests.

pub mod mastodon;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DirectMessage, Relationship, Status, Trends, UserList};

/// Error code some servers return in the body for a missing resource
pub const PAGE_NOT_FOUND: i32 = 34;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure of one remote call.
///
/// Cloneable so it can travel inside fetch results and domain events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response
    #[error("HTTP error: {0}")]
    Transport(String),
    /// The server answered with an error status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Server-specific error code, when the body carried one
        code: Option<i32>,
        /// Error description from the body
        message: String,
    },
    /// The response body did not match the expected shape
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// HTTP status code, if the server answered
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-specific error code, if any
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the target resource does not exist (anymore)
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status_code(), Some(404))
            || matches!(self.error_code(), Some(PAGE_NOT_FOUND))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Deserialize(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Page request: at most `count` items with `since_id < id < max_id`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    /// Page size
    pub count: Option<usize>,
    /// Exclusive upper bound
    pub max_id: Option<i64>,
    /// Exclusive lower bound
    pub since_id: Option<i64>,
}

impl Paging {
    /// Empty paging (server defaults)
    pub const fn new() -> Self {
        Self {
            count: None,
            max_id: None,
            since_id: None,
        }
    }

    /// Set the page size
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the exclusive upper bound
    pub const fn max_id(mut self, max_id: i64) -> Self {
        self.max_id = Some(max_id);
        self
    }

    /// Set the exclusive lower bound
    pub const fn since_id(mut self, since_id: i64) -> Self {
        self.since_id = Some(since_id);
        self
    }

    /// Query parameters for the request URL
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(count) = self.count {
            pairs.push(("limit", count.to_string()));
        }
        if let Some(max_id) = self.max_id {
            pairs.push(("max_id", max_id.to_string()));
        }
        if let Some(since_id) = self.since_id {
            pairs.push(("since_id", since_id.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Client traits
// ---------------------------------------------------------------------------

/// One authenticated session against the social network.
///
/// Every method is one network call. Pages come back newest first.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Home timeline page
    async fn home_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError>;

    /// Mentions page
    async fn mentions_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError>;

    /// Received direct messages page
    async fn received_direct_messages(
        &self,
        paging: &Paging,
    ) -> Result<Vec<DirectMessage>, ApiError>;

    /// Sent direct messages page
    async fn sent_direct_messages(&self, paging: &Paging) -> Result<Vec<DirectMessage>, ApiError>;

    /// Trends for a region
    async fn location_trends(&self, woeid: i64) -> Result<Trends, ApiError>;

    /// Favorite a status
    async fn create_favorite(&self, status_id: i64) -> Result<Status, ApiError>;

    /// Unfavorite a status
    async fn destroy_favorite(&self, status_id: i64) -> Result<Status, ApiError>;

    /// Retweet a status, returning the new retweet
    async fn retweet_status(&self, status_id: i64) -> Result<Status, ApiError>;

    /// Delete a status (or one's own retweet)
    async fn destroy_status(&self, status_id: i64) -> Result<Status, ApiError>;

    /// Delete a direct message
    async fn destroy_direct_message(&self, message_id: i64) -> Result<DirectMessage, ApiError>;

    /// Follow a user
    async fn create_friendship(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Unfollow a user
    async fn destroy_friendship(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Accept a pending follow request
    async fn accept_friendship(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Reject a pending follow request
    async fn deny_friendship(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Block a user
    async fn create_block(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Unblock a user
    async fn destroy_block(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Mute a user
    async fn create_mute(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Unmute a user
    async fn destroy_mute(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Report a user for spam
    async fn report_spam(&self, user_id: i64) -> Result<Relationship, ApiError>;

    /// Add users to a list
    async fn add_user_list_members(
        &self,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, ApiError>;

    /// Remove users from a list
    async fn delete_user_list_members(
        &self,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, ApiError>;
}

/// Produces an authenticated client for an account.
#[async_trait]
pub trait ClientResolver: Send + Sync {
    /// Client for `account_id`, or `None` when the account has no usable session
    async fn client_for(&self, account_id: i64) -> Option<Arc<dyn RemoteClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_by_status_or_code() {
        let by_status = ApiError::Api {
            status: 404,
            code: None,
            message: "Record not found".to_string(),
        };
        let by_code = ApiError::Api {
            status: 400,
            code: Some(PAGE_NOT_FOUND),
            message: "Sorry, that page does not exist".to_string(),
        };
        let other = ApiError::Api {
            status: 500,
            code: None,
            message: "boom".to_string(),
        };

        assert!(by_status.is_not_found());
        assert!(by_code.is_not_found());
        assert!(!other.is_not_found());
        assert!(!ApiError::Transport("reset".to_string()).is_not_found());
    }

    #[test]
    fn test_paging_query_pairs() {
        let paging = Paging::new().count(20).since_id(99);
        assert_eq!(
            paging.query_pairs(),
            vec![("limit", "20".to_string()), ("since_id", "99".to_string())]
        );
    }
}
