//! Scripted fakes for the remote client boundary

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{ApiError, ClientResolver, Paging, RemoteClient};
use crate::models::{DirectMessage, Relationship, Status, Trends, User, UserList};

type Page<T> = Result<Vec<T>, ApiError>;

#[derive(Default)]
struct Script {
    home: VecDeque<Page<Status>>,
    mentions: VecDeque<Page<Status>>,
    received: VecDeque<Page<DirectMessage>>,
    sent: VecDeque<Page<DirectMessage>>,
    trends: VecDeque<Result<Trends, ApiError>>,
    failures: HashMap<i64, ApiError>,
    home_pagings: Vec<Paging>,
    mention_pagings: Vec<Paging>,
    received_pagings: Vec<Paging>,
    calls: Vec<String>,
}

/// Remote client answering from scripted queues.
///
/// Empty queues answer with empty pages; mutations succeed unless a failure
/// was scripted for their target id.
#[derive(Clone, Default)]
pub struct FakeClient {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering every call
    pub fn with_delay_ms(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn push_home(&self, page: Page<Status>) {
        self.script.lock().unwrap().home.push_back(page);
    }

    pub fn push_mentions(&self, page: Page<Status>) {
        self.script.lock().unwrap().mentions.push_back(page);
    }

    pub fn push_received(&self, page: Page<DirectMessage>) {
        self.script.lock().unwrap().received.push_back(page);
    }

    pub fn push_sent(&self, page: Page<DirectMessage>) {
        self.script.lock().unwrap().sent.push_back(page);
    }

    pub fn push_trends(&self, trends: Result<Trends, ApiError>) {
        self.script.lock().unwrap().trends.push_back(trends);
    }

    /// Make every mutation on `target_id` fail with `error`
    pub fn fail_target(&self, target_id: i64, error: ApiError) {
        self.script.lock().unwrap().failures.insert(target_id, error);
    }

    pub fn home_pagings(&self) -> Vec<Paging> {
        self.script.lock().unwrap().home_pagings.clone()
    }

    pub fn mention_pagings(&self) -> Vec<Paging> {
        self.script.lock().unwrap().mention_pagings.clone()
    }

    pub fn received_pagings(&self) -> Vec<Paging> {
        self.script.lock().unwrap().received_pagings.clone()
    }

    /// Names of the calls made, in order
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    async fn enter(&self, call: &str) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().unwrap().calls.push(call.to_string());
    }

    async fn mutate<T>(&self, call: &str, target_id: i64, ok: T) -> Result<T, ApiError> {
        self.enter(&format!("{call}:{target_id}")).await;
        match self.script.lock().unwrap().failures.get(&target_id) {
            Some(error) => Err(error.clone()),
            None => Ok(ok),
        }
    }
}

fn author() -> User {
    User::new(900, "author")
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn home_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError> {
        self.enter("home_timeline").await;
        let mut script = self.script.lock().unwrap();
        script.home_pagings.push(*paging);
        script.home.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn mentions_timeline(&self, paging: &Paging) -> Result<Vec<Status>, ApiError> {
        self.enter("mentions_timeline").await;
        let mut script = self.script.lock().unwrap();
        script.mention_pagings.push(*paging);
        script.mentions.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn received_direct_messages(
        &self,
        paging: &Paging,
    ) -> Result<Vec<DirectMessage>, ApiError> {
        self.enter("received_direct_messages").await;
        let mut script = self.script.lock().unwrap();
        script.received_pagings.push(*paging);
        script.received.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn sent_direct_messages(&self, _paging: &Paging) -> Result<Vec<DirectMessage>, ApiError> {
        self.enter("sent_direct_messages").await;
        let mut script = self.script.lock().unwrap();
        script.sent.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn location_trends(&self, woeid: i64) -> Result<Trends, ApiError> {
        self.enter("location_trends").await;
        let mut script = self.script.lock().unwrap();
        script.trends.pop_front().unwrap_or_else(|| {
            Ok(Trends {
                woeid,
                as_of: Utc::now(),
                trends: Vec::new(),
            })
        })
    }

    async fn create_favorite(&self, status_id: i64) -> Result<Status, ApiError> {
        let mut status = Status::new(status_id, author());
        status.is_favorite = true;
        self.mutate("create_favorite", status_id, status).await
    }

    async fn destroy_favorite(&self, status_id: i64) -> Result<Status, ApiError> {
        self.mutate("destroy_favorite", status_id, Status::new(status_id, author()))
            .await
    }

    async fn retweet_status(&self, status_id: i64) -> Result<Status, ApiError> {
        let mut retweet = Status::new(status_id + 1000, author());
        retweet.retweet_id = Some(status_id);
        self.mutate("retweet_status", status_id, retweet).await
    }

    async fn destroy_status(&self, status_id: i64) -> Result<Status, ApiError> {
        self.mutate("destroy_status", status_id, Status::new(status_id, author()))
            .await
    }

    async fn destroy_direct_message(&self, message_id: i64) -> Result<DirectMessage, ApiError> {
        let message = DirectMessage::new(message_id, author(), User::new(1, "me"), "");
        self.mutate("destroy_direct_message", message_id, message)
            .await
    }

    async fn create_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        let relationship = Relationship {
            user_id,
            following: true,
            ..Relationship::default()
        };
        self.mutate("create_friendship", user_id, relationship).await
    }

    async fn destroy_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("destroy_friendship", user_id, relationship(user_id))
            .await
    }

    async fn accept_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("accept_friendship", user_id, relationship(user_id))
            .await
    }

    async fn deny_friendship(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("deny_friendship", user_id, relationship(user_id))
            .await
    }

    async fn create_block(&self, user_id: i64) -> Result<Relationship, ApiError> {
        let relationship = Relationship {
            user_id,
            blocking: true,
            ..Relationship::default()
        };
        self.mutate("create_block", user_id, relationship).await
    }

    async fn destroy_block(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("destroy_block", user_id, relationship(user_id))
            .await
    }

    async fn create_mute(&self, user_id: i64) -> Result<Relationship, ApiError> {
        let relationship = Relationship {
            user_id,
            muting: true,
            ..Relationship::default()
        };
        self.mutate("create_mute", user_id, relationship).await
    }

    async fn destroy_mute(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("destroy_mute", user_id, relationship(user_id))
            .await
    }

    async fn report_spam(&self, user_id: i64) -> Result<Relationship, ApiError> {
        self.mutate("report_spam", user_id, relationship(user_id))
            .await
    }

    async fn add_user_list_members(
        &self,
        list_id: i64,
        _user_ids: &[i64],
    ) -> Result<UserList, ApiError> {
        self.mutate("add_user_list_members", list_id, list(list_id))
            .await
    }

    async fn delete_user_list_members(
        &self,
        list_id: i64,
        _user_ids: &[i64],
    ) -> Result<UserList, ApiError> {
        self.mutate("delete_user_list_members", list_id, list(list_id))
            .await
    }
}

fn relationship(user_id: i64) -> Relationship {
    Relationship {
        user_id,
        ..Relationship::default()
    }
}

fn list(list_id: i64) -> UserList {
    UserList {
        id: list_id,
        name: "list".to_string(),
    }
}

/// Resolver over a fixed set of fake clients
#[derive(Default)]
pub struct FakeResolver {
    clients: HashMap<i64, Arc<dyn RemoteClient>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, account_id: i64, client: FakeClient) -> Self {
        self.clients.insert(account_id, Arc::new(client));
        self
    }
}

#[async_trait]
impl ClientResolver for FakeResolver {
    async fn client_for(&self, account_id: i64) -> Option<Arc<dyn RemoteClient>> {
        self.clients.get(&account_id).cloned()
    }
}

/// A status stored for `account_id`, authored by user 900
pub fn status(account_id: i64, id: i64) -> Status {
    let mut status = Status::new(id, author());
    status.account_id = account_id;
    status
}

/// A page of statuses with the given ids, not yet assigned to an account
pub fn status_ids(ids: &[i64]) -> Vec<Status> {
    ids.iter().map(|&id| Status::new(id, author())).collect()
}

/// A received message stored for `account_id`
pub fn message(account_id: i64, id: i64) -> DirectMessage {
    let mut message = DirectMessage::new(id, author(), User::new(1, "me"), "hi");
    message.account_id = account_id;
    message
}
