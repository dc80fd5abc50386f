//! Mastodon API client
//!
//! Mastodon has no dedicated mentions or direct-message timelines; both are
//! read from the notifications endpoint. Notification ids are a separate
//! sequence from status ids, so items from that endpoint carry the
//! notification id as their `paging_id` and paging bounds refer to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::models::{DirectMessage, Relationship, Status, Trend, Trends, User, UserList, UserMention};

use super::{ApiError, Paging, RemoteClient};

/// Mastodon API client
pub struct MastodonClient {
    client: Client,
    instance: String,
    access_token: String,
    me: OnceCell<User>,
}

impl MastodonClient {
    /// Create a new Mastodon client
    pub fn new(instance: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            instance: instance.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            me: OnceCell::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1{}", self.instance, endpoint)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.access_token));
        if let Some(form) = form {
            request = request.form(form);
        }
        let response = request.send().await?;
        parse_response(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = with_query(&self.api_url(endpoint), query);
        self.call(Method::GET, &url, None).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.call(Method::POST, &self.api_url(endpoint), Some(form))
            .await
    }

    /// Verify credentials and get the account owner
    pub async fn verify_credentials(&self) -> Result<User, ApiError> {
        let account: MastodonAccount = self.get("/accounts/verify_credentials", &[]).await?;
        account.into_user()
    }

    async fn own_user(&self) -> Result<&User, ApiError> {
        self.me
            .get_or_try_init(|| self.verify_credentials())
            .await
    }

    /// Statuses of mention notifications, paired with the notification id
    async fn mention_notifications(
        &self,
        paging: &Paging,
    ) -> Result<Vec<(i64, MastodonStatus)>, ApiError> {
        let mut query = paging.query_pairs();
        query.push(("types[]", "mention".to_string()));
        let notifications: Vec<MastodonNotification> = self.get("/notifications", &query).await?;
        notification_statuses(notifications)
    }

    async fn relationship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        let relationships: Vec<MastodonRelationship> = self
            .get("/accounts/relationships", &[("id[]", user_id.to_string())])
            .await?;
        relationships
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Deserialize("empty relationships response".to_string()))?
            .into_relationship()
    }

    async fn relationship_action(&self, path: &str) -> Result<Relationship, ApiError> {
        let relationship: MastodonRelationship = self.post(path, &[]).await?;
        relationship.into_relationship()
    }

    async fn list_members(
        &self,
        method: Method,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, ApiError> {
        let form: Vec<(&str, String)> = user_ids
            .iter()
            .map(|id| ("account_ids[]", id.to_string()))
            .collect();
        let url = self.api_url(&format!("/lists/{list_id}/accounts"));
        let _: serde_json::Value = self.call(method, &url, Some(form.as_slice())).await?;

        let list: MastodonList = self.get(&format!("/lists/{list_id}"), &[]).await?;
        Ok(UserList {
            id: parse_id(&list.id)?,
            name: list.title,
        })
    }
}

#[async_trait]
impl RemoteClient for MastodonClient {
    async fn home_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError> {
        let statuses: Vec<MastodonStatus> =
            self.get("/timelines/home", &paging.query_pairs()).await?;
        statuses.into_iter().map(MastodonStatus::into_status).collect()
    }

    async fn mentions_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError> {
        self.mention_notifications(paging)
            .await?
            .into_iter()
            .map(|(notification_id, status)| {
                let mut status = status.into_status()?;
                status.paging_id = Some(notification_id);
                Ok(status)
            })
            .collect()
    }

    async fn received_direct_messages(
        &self,
        paging: &Paging,
    ) -> Result<Vec<DirectMessage>, ApiError> {
        let me = self.own_user().await?.clone();
        self.mention_notifications(paging)
            .await?
            .into_iter()
            .filter(|(_, status)| status.is_direct())
            .map(|(notification_id, status)| {
                let mut message = status.into_direct_message(Some(me.clone()), false)?;
                message.paging_id = Some(notification_id);
                Ok(message)
            })
            .collect()
    }

    async fn sent_direct_messages(&self, paging: &Paging) -> Result<Vec<DirectMessage>, ApiError> {
        let me = self.own_user().await?;
        let statuses: Vec<MastodonStatus> = self
            .get(&format!("/accounts/{}/statuses", me.id), &paging.query_pairs())
            .await?;
        statuses
            .into_iter()
            .filter(MastodonStatus::is_direct)
            .map(|status| status.into_direct_message(None, true))
            .collect()
    }

    async fn location_trends(&self, woeid: i64) -> Result<Trends, ApiError> {
        // Mastodon trends are server-wide; the region id is only recorded.
        let tags: Vec<MastodonTag> = self
            .get("/trends/tags", &[("limit", "20".to_string())])
            .await?;
        Ok(Trends {
            woeid,
            as_of: Utc::now(),
            trends: tags
                .into_iter()
                .map(|tag| Trend {
                    name: format!("#{}", tag.name),
                    query: tag.name,
                    url: tag.url,
                })
                .collect(),
        })
    }

    async fn create_favorite(&self, status_id: i64) -> Result<Status, ApiError> {
        let status: MastodonStatus = self
            .post(&format!("/statuses/{status_id}/favourite"), &[])
            .await?;
        status.into_status()
    }

    async fn destroy_favorite(&self, status_id: i64) -> Result<Status, ApiError> {
        let status: MastodonStatus = self
            .post(&format!("/statuses/{status_id}/unfavourite"), &[])
            .await?;
        status.into_status()
    }

    async fn retweet_status(&self, status_id: i64) -> Result<Status, ApiError> {
        let status: MastodonStatus = self
            .post(&format!("/statuses/{status_id}/reblog"), &[])
            .await?;
        status.into_status()
    }

    async fn destroy_status(&self, status_id: i64) -> Result<Status, ApiError> {
        let url = self.api_url(&format!("/statuses/{status_id}"));
        let status: MastodonStatus = self.call(Method::DELETE, &url, None).await?;
        status.into_status()
    }

    async fn destroy_direct_message(&self, message_id: i64) -> Result<DirectMessage, ApiError> {
        let url = self.api_url(&format!("/statuses/{message_id}"));
        let status: MastodonStatus = self.call(Method::DELETE, &url, None).await?;
        status.into_direct_message(None, true)
    }

    async fn create_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/follow"))
            .await
    }

    async fn destroy_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/unfollow"))
            .await
    }

    async fn accept_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/follow_requests/{user_id}/authorize"))
            .await
    }

    async fn deny_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/follow_requests/{user_id}/reject"))
            .await
    }

    async fn create_block(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/block"))
            .await
    }

    async fn destroy_block(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/unblock"))
            .await
    }

    async fn create_mute(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/mute"))
            .await
    }

    async fn destroy_mute(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.relationship_action(&format!("/accounts/{user_id}/unmute"))
            .await
    }

    async fn report_spam(&self, user_id: i64) -> Result<Relationship, ApiError> {
        let form = [
            ("account_id", user_id.to_string()),
            ("category", "spam".to_string()),
        ];
        let _: serde_json::Value = self.post("/reports", &form).await?;
        self.relationship(user_id).await
    }

    async fn add_user_list_members(
        &self,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, ApiError> {
        self.list_members(Method::POST, list_id, user_ids).await
    }

    async fn delete_user_list_members(
        &self,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, ApiError> {
        self.list_members(Method::DELETE, list_id, user_ids).await
    }
}

/// Turn an HTTP response into a typed value or an [`ApiError`]
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<MastodonError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        return Err(ApiError::Api {
            status: status.as_u16(),
            code: None,
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Deserialize(e.to_string()))
}

fn with_query(url: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded: Vec<String> = query
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect();
    format!("{url}?{}", encoded.join("&"))
}

fn parse_id(id: &str) -> Result<i64, ApiError> {
    id.parse()
        .map_err(|_| ApiError::Deserialize(format!("non-numeric id: {id}")))
}

/// Strip HTML from Mastodon content
fn strip_html(html: &str) -> String {
    let content = html_escape::decode_html_entities(html)
        .to_string()
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p><p>", "\n\n");

    regex_lite::Regex::new(r"<[^>]+>")
        .map(|re| re.replace_all(&content, "").to_string())
        .unwrap_or(content)
}

// ==================== API Types ====================

#[derive(Debug, Deserialize)]
struct MastodonError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct MastodonStatus {
    id: String,
    created_at: String,
    content: String,
    url: Option<String>,
    #[serde(default)]
    visibility: String,
    account: MastodonAccount,
    reblog: Option<Box<Self>>,
    #[serde(default)]
    favourites_count: u32,
    #[serde(default)]
    reblogs_count: u32,
    #[serde(default)]
    replies_count: u32,
    favourited: Option<bool>,
    in_reply_to_id: Option<String>,
    #[serde(default)]
    mentions: Vec<MastodonMention>,
}

#[derive(Debug, Deserialize)]
struct MastodonAccount {
    id: String,
    username: String,
    display_name: String,
    avatar: String,
    #[serde(default)]
    acct: String,
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct MastodonMention {
    id: String,
    acct: String,
}

#[derive(Debug, Deserialize)]
struct MastodonNotification {
    id: String,
    status: Option<MastodonStatus>,
}

/// Keep notifications that carry a status
fn notification_statuses(
    notifications: Vec<MastodonNotification>,
) -> Result<Vec<(i64, MastodonStatus)>, ApiError> {
    notifications
        .into_iter()
        .filter_map(|n| n.status.map(|status| (n.id, status)))
        .map(|(id, status)| Ok((parse_id(&id)?, status)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct MastodonTag {
    name: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MastodonList {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
struct MastodonRelationship {
    id: String,
    #[serde(default)]
    following: bool,
    #[serde(default)]
    followed_by: bool,
    #[serde(default)]
    blocking: bool,
    #[serde(default)]
    blocked_by: bool,
    #[serde(default)]
    muting: bool,
    #[serde(default = "default_true")]
    showing_reblogs: bool,
    #[serde(default)]
    notifying: bool,
    #[serde(default)]
    requested: bool,
}

const fn default_true() -> bool {
    true
}

impl MastodonAccount {
    fn into_user(self) -> Result<User, ApiError> {
        Ok(User {
            id: parse_id(&self.id)?,
            screen_name: if self.acct.is_empty() {
                self.username
            } else {
                self.acct
            },
            name: self.display_name,
            avatar_url: Some(self.avatar),
            is_protected: self.locked,
        })
    }
}

impl MastodonRelationship {
    fn into_relationship(self) -> Result<Relationship, ApiError> {
        Ok(Relationship {
            user_id: parse_id(&self.id)?,
            following: self.following,
            followed_by: self.followed_by,
            blocking: self.blocking,
            blocked_by: self.blocked_by,
            muting: self.muting,
            retweet_enabled: self.showing_reblogs,
            notifications_enabled: self.notifying,
            can_dm: !self.blocking && !self.blocked_by,
            requested: self.requested,
        })
    }
}

impl MastodonStatus {
    fn is_direct(&self) -> bool {
        self.visibility == "direct"
    }

    fn created_at(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
    }

    fn into_status(self) -> Result<Status, ApiError> {
        let id = parse_id(&self.id)?;

        // A reblog is stored under the wrapper id, pointing at the original
        if let Some(reblog) = self.reblog {
            let mut status = reblog.into_status()?;
            status.retweet_id = Some(status.id);
            status.id = id;
            status.retweeted_by = Some(self.account.into_user()?);
            return Ok(status);
        }

        let created_at = self.created_at();
        let mentions = self
            .mentions
            .into_iter()
            .map(|m| {
                Ok(UserMention {
                    id: parse_id(&m.id)?,
                    screen_name: m.acct,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Status {
            id,
            account_id: 0,
            user: self.account.into_user()?,
            text: strip_html(&self.content),
            text_html: Some(self.content),
            created_at,
            url: self.url,
            retweet_id: None,
            retweeted_by: None,
            my_retweet_id: None,
            is_favorite: self.favourited.unwrap_or(false),
            is_gap: false,
            favorite_count: self.favourites_count,
            retweet_count: self.reblogs_count,
            reply_count: self.replies_count,
            in_reply_to_status_id: self.in_reply_to_id.as_deref().map(parse_id).transpose()?,
            mentions,
            paging_id: None,
        })
    }

    /// Map a direct-visibility status to a message.
    ///
    /// Without an explicit recipient the first mentioned user is used.
    fn into_direct_message(
        self,
        recipient: Option<User>,
        is_outgoing: bool,
    ) -> Result<DirectMessage, ApiError> {
        let created_at = self.created_at();
        let recipient = match recipient {
            Some(user) => user,
            None => match self.mentions.first() {
                Some(mention) => User::new(parse_id(&mention.id)?, &mention.acct),
                None => User::default(),
            },
        };

        Ok(DirectMessage {
            id: parse_id(&self.id)?,
            account_id: 0,
            sender: self.account.into_user()?,
            recipient,
            text: strip_html(&self.content),
            created_at,
            is_outgoing,
            paging_id: None,
        })
    }
}

/// OAuth authentication flow for Mastodon
pub mod oauth {
    use anyhow::{Context, Result};
    use reqwest::Client;
    use serde::Deserialize;

    const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
    const SCOPES: &str = "read write follow";

    /// Registered OAuth application credentials
    #[derive(Debug, Deserialize)]
    pub struct OAuthApp {
        /// OAuth client ID
        pub client_id: String,
        /// OAuth client secret
        pub client_secret: String,
    }

    /// OAuth access token response
    #[derive(Debug, Deserialize)]
    pub struct OAuthToken {
        /// Access token for API requests
        pub access_token: String,
        /// Token type (usually "Bearer")
        pub token_type: String,
    }

    /// Register an OAuth application with an instance
    pub async fn register_app(instance: &str) -> Result<OAuthApp> {
        let client = Client::new();
        let url = format!("{}/api/v1/apps", instance.trim_end_matches('/'));

        let params = [
            ("client_name", "Roost"),
            ("redirect_uris", REDIRECT_URI),
            ("scopes", SCOPES),
        ];

        let response = client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to register app")?;

        response
            .json()
            .await
            .context("Failed to parse app registration response")
    }

    /// Get the authorization URL for the user to visit
    pub fn get_auth_url(instance: &str, client_id: &str) -> String {
        format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}",
            instance.trim_end_matches('/'),
            client_id,
            urlencoding::encode(REDIRECT_URI),
            urlencoding::encode(SCOPES)
        )
    }

    /// Exchange authorization code for access token
    pub async fn get_token(
        instance: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<OAuthToken> {
        let client = Client::new();
        let url = format!("{}/oauth/token", instance.trim_end_matches('/'));

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", REDIRECT_URI),
            ("code", code),
            ("scope", SCOPES),
        ];

        let response = client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to get access token")?;

        response
            .json()
            .await
            .context("Failed to parse token response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_json(id: &str, acct: &str) -> String {
        format!(
            r#"{{"id":"{id}","username":"{acct}","acct":"{acct}","display_name":"","avatar":"https://a/{id}.png"}}"#
        )
    }

    #[test]
    fn test_reblog_is_stored_under_wrapper_id() {
        let json = format!(
            r#"{{
                "id": "200", "created_at": "2024-05-01T10:00:00.000Z", "content": "", "url": null,
                "visibility": "public", "account": {booster},
                "reblog": {{
                    "id": "150", "created_at": "2024-05-01T09:00:00.000Z",
                    "content": "<p>hello &amp; welcome</p>", "url": "https://x/150",
                    "visibility": "public", "account": {author}, "reblog": null,
                    "favourites_count": 3, "reblogs_count": 1, "replies_count": 0,
                    "favourited": true, "in_reply_to_id": null,
                    "mentions": [{{"id": "77", "acct": "carol"}}]
                }}
            }}"#,
            booster = account_json("2", "bob"),
            author = account_json("1", "alice"),
        );

        let raw: MastodonStatus = serde_json::from_str(&json).unwrap();
        let status = raw.into_status().unwrap();

        assert_eq!(status.id, 200);
        assert_eq!(status.retweet_id, Some(150));
        assert_eq!(status.user.screen_name, "alice");
        assert_eq!(status.retweeted_by.as_ref().map(|u| u.id), Some(2));
        assert_eq!(status.text, "hello & welcome");
        assert!(status.is_favorite);
        assert_eq!(status.mentions[0].id, 77);
    }

    #[test]
    fn test_non_numeric_id_is_rejected() {
        let json = format!(
            r#"{{"id": "abc", "created_at": "2024-05-01T10:00:00Z", "content": "",
                "url": null, "account": {}, "reblog": null, "favourited": null,
                "in_reply_to_id": null}}"#,
            account_json("1", "alice")
        );
        let raw: MastodonStatus = serde_json::from_str(&json).unwrap();
        assert!(matches!(raw.into_status(), Err(ApiError::Deserialize(_))));
    }

    #[test]
    fn test_notifications_keep_their_own_ids() {
        let status = |id: &str| {
            format!(
                r#"{{"id": "{id}", "created_at": "2024-05-01T10:00:00Z", "content": "<p>hi</p>",
                    "url": null, "visibility": "direct", "account": {}, "reblog": null,
                    "favourited": null, "in_reply_to_id": null}}"#,
                account_json("1", "alice")
            )
        };
        let json = format!(
            r#"[
                {{"id": "5002", "status": {}}},
                {{"id": "5001", "status": null}},
                {{"id": "5000", "status": {}}}
            ]"#,
            status("110000000000000300"),
            status("110000000000000100"),
        );

        let notifications: Vec<MastodonNotification> = serde_json::from_str(&json).unwrap();
        let pairs = notification_statuses(notifications).unwrap();

        assert_eq!(pairs.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![5002, 5000]);
        let (notification_id, raw) = pairs.into_iter().next().unwrap();
        assert!(raw.is_direct());
        let status = raw.into_status().unwrap();
        assert_eq!(status.id, 110_000_000_000_000_300);
        assert_eq!(notification_id, 5002);
    }

    #[test]
    fn test_with_query_encodes_values() {
        let url = with_query(
            "https://x/api/v1/notifications",
            &[("types[]", "mention".to_string()), ("max_id", "10".to_string())],
        );
        assert_eq!(url, "https://x/api/v1/notifications?types[]=mention&max_id=10");
    }
}
