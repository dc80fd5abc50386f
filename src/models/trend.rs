//! Trends model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trending topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    /// Display name (hashtags keep their leading `#`)
    pub name: String,
    /// Search query for the topic
    pub query: String,
    /// Web URL
    pub url: Option<String>,
}

impl Trend {
    /// Hashtag form of the name: leading `#` stripped once
    pub fn hashtag(&self) -> &str {
        self.name.strip_prefix('#').unwrap_or(&self.name)
    }
}

/// Trends for one region at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trends {
    /// Region id the trends were requested for
    pub woeid: i64,
    /// When the server computed them
    pub as_of: DateTime<Utc>,
    /// Topics, most popular first
    pub trends: Vec<Trend>,
}
