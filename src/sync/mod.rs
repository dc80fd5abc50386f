//! Background synchronization between remote accounts and the local store
//!
//! ```text
//!  get_* / refresh_all                      mutations
//!         │                                     │
//!         ▼                                     ▼
//!  SingleFlight slot ──► Fetch task      Mutation task
//!         (per class)     │ fan_out            │ one remote call
//!                         ▼                    ▼
//!               Store task + CacheUsers   local rows + event
//!                         │
//!                         ▼
//!                 Database ──► EventBus
//! ```
//!
//! A [`SyncCoordinator`] is built explicitly and cloned into whatever needs it.

pub mod fetch;
pub mod inflight;
pub mod merge;
pub mod mutations;
pub mod tasks;

use std::future::Future;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, ClientResolver, Paging, RemoteClient};
use crate::config::Config;
use crate::db::{Collection, Database};
use crate::events::{EventBus, Notice};
use crate::models::{DirectMessage, Status};

pub use fetch::{FetchBoundaries, FetchResult, fan_out, fetch_account_page, truncate_items};
pub use inflight::{DraftSet, InFlightGuard, InFlightIndex};
pub use merge::{GapCheck, MergeSummary};
pub use mutations::{Applied, MutationError, MutationIndexes, MutationRequest};
pub use tasks::{ResourceClass, SingleFlight, TaskId, TaskManager, TaskTag};

/// Entry point for refreshes, mutations and their bookkeeping
#[derive(Clone)]
pub struct SyncCoordinator {
    resolver: Arc<dyn ClientResolver>,
    db: Arc<Mutex<Database>>,
    bus: EventBus,
    config: Arc<RwLock<Config>>,
    tasks: TaskManager,
    slots: SingleFlight,
    mutations: MutationIndexes,
    drafts: DraftSet,
}

impl SyncCoordinator {
    /// Build a coordinator over an opened database.
    ///
    /// The task pool is sized from `config.max_concurrent_tasks`.
    pub fn new(
        resolver: Arc<dyn ClientResolver>,
        db: Arc<Mutex<Database>>,
        bus: EventBus,
        config: Config,
    ) -> Self {
        let tasks = TaskManager::new(config.max_concurrent_tasks);
        Self {
            resolver,
            db,
            drafts: DraftSet::new(bus.clone()),
            bus,
            config: Arc::new(RwLock::new(config)),
            tasks,
            slots: SingleFlight::default(),
            mutations: MutationIndexes::default(),
        }
    }

    /// Event bus the coordinator publishes on
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Shared handle to the local store
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.config
            .read()
            .map(|config| config.clone())
            .unwrap_or_default()
    }

    /// Replace the configuration; running fetches keep their snapshot
    pub fn set_config(&self, config: Config) {
        if let Ok(mut current) = self.config.write() {
            *current = config;
        }
    }

    /// Background task pool
    pub const fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Wait until no background task is running
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }

    // ==================== Fetches ====================

    /// Refresh or page the home timeline of `boundaries`' accounts
    pub fn get_home_timeline(&self, boundaries: FetchBoundaries) -> TaskId {
        self.start_status_fetch(ResourceClass::HomeTimeline, boundaries, |client, paging| async move {
            client.home_timeline(&paging).await
        })
    }

    /// Refresh or page the mentions of `boundaries`' accounts
    pub fn get_mentions_timeline(&self, boundaries: FetchBoundaries) -> TaskId {
        self.start_status_fetch(ResourceClass::Mentions, boundaries, |client, paging| async move {
            client.mentions_timeline(&paging).await
        })
    }

    /// Refresh or page received direct messages
    pub fn get_received_direct_messages(&self, boundaries: FetchBoundaries) -> TaskId {
        self.start_message_fetch(
            ResourceClass::ReceivedMessages,
            boundaries,
            |client, paging| async move { client.received_direct_messages(&paging).await },
        )
    }

    /// Refresh or page sent direct messages
    pub fn get_sent_direct_messages(&self, boundaries: FetchBoundaries) -> TaskId {
        self.start_message_fetch(
            ResourceClass::SentMessages,
            boundaries,
            |client, paging| async move { client.sent_direct_messages(&paging).await },
        )
    }

    /// Fetch trends for region `woeid` through one account and replace the local trends
    pub fn get_local_trends(&self, account_id: i64, woeid: i64) -> TaskId {
        let class = ResourceClass::LocalTrends;
        let coordinator = self.clone();
        self.slots.replace(class, &self.tasks, || {
            self.tasks.spawn_with(TaskTag::Fetch(class), move |task_id| async move {
                let result = match coordinator.resolver.client_for(account_id).await {
                    Some(client) => Some(client.location_trends(woeid).await),
                    None => {
                        tracing::debug!(account_id, "no client for trends");
                        None
                    }
                };
                if !coordinator.slots.finish(class, task_id) {
                    tracing::debug!(task_id, "stale trends result ignored");
                    return;
                }

                match result {
                    Some(Ok(trends)) => {
                        let store = coordinator.clone();
                        coordinator.tasks.spawn(TaskTag::Store(class), async move {
                            let stored = {
                                let db = store.db.lock().await;
                                merge::store_trends(&db, &trends, true)
                            };
                            if let Err(e) = stored {
                                tracing::warn!("storing trends failed: {e:#}");
                                store
                                    .bus
                                    .notice(Notice::Error(format!("Failed to store trends: {e:#}")));
                            }
                        });
                    }
                    Some(Err(e)) => {
                        tracing::warn!(account_id, woeid, "trends fetch failed: {e}");
                        coordinator.surface_fetch_error(class, &e);
                    }
                    None => {}
                }
            })
        })
    }

    /// Refresh every activated account
    pub async fn refresh_all(&self) -> Result<Vec<TaskId>> {
        let account_ids = self.db.lock().await.activated_account_ids()?;
        self.refresh_all_for(&account_ids).await
    }

    /// Refresh the given accounts: home timeline always, mentions, messages
    /// and trends as configured. New items are requested above the newest
    /// stored paging id per account.
    pub async fn refresh_all_for(&self, account_ids: &[i64]) -> Result<Vec<TaskId>> {
        if account_ids.is_empty() {
            tracing::debug!("no activated accounts, nothing to refresh");
            return Ok(Vec::new());
        }
        let config = self.config();

        let (newest_statuses, newest_mentions, newest_inbox, default_account) = {
            let db = self.db.lock().await;
            (
                db.newest_paging_ids(Collection::HomeStatuses, account_ids)?,
                db.newest_paging_ids(Collection::Mentions, account_ids)?,
                db.newest_paging_ids(Collection::Inbox, account_ids)?,
                db.get_default_account()?,
            )
        };

        let mut started = Vec::new();
        if config.refresh_mentions {
            started.push(self.get_mentions_timeline(FetchBoundaries::new(
                account_ids.to_vec(),
                None,
                Some(newest_mentions),
            )));
        }
        if config.refresh_direct_messages {
            started.push(self.get_received_direct_messages(FetchBoundaries::new(
                account_ids.to_vec(),
                None,
                Some(newest_inbox),
            )));
            started.push(
                self.get_sent_direct_messages(FetchBoundaries::unbounded(account_ids.to_vec())),
            );
        }
        if config.refresh_trends {
            match default_account {
                Some(account) => {
                    started.push(self.get_local_trends(account.id, config.local_trends_woeid));
                }
                None => tracing::debug!("no default account, skipping trends"),
            }
        }
        started.push(self.get_home_timeline(FetchBoundaries::new(
            account_ids.to_vec(),
            None,
            Some(newest_statuses),
        )));

        tracing::info!(accounts = account_ids.len(), tasks = started.len(), "refresh started");
        Ok(started)
    }

    fn start_status_fetch<F, Fut>(
        &self,
        class: ResourceClass,
        boundaries: FetchBoundaries,
        fetch: F,
    ) -> TaskId
    where
        F: Fn(Arc<dyn RemoteClient>, Paging) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Status>, ApiError>> + Send + 'static,
    {
        let limit = self.config().load_item_limit;
        let coordinator = self.clone();
        self.slots.replace(class, &self.tasks, || {
            self.tasks.spawn_with(TaskTag::Fetch(class), move |task_id| async move {
                let results =
                    fan_out(Arc::clone(&coordinator.resolver), &boundaries, limit, fetch).await;
                coordinator.finish_status_fetch(class, task_id, &boundaries, results);
            })
        })
    }

    fn finish_status_fetch(
        &self,
        class: ResourceClass,
        task_id: TaskId,
        boundaries: &FetchBoundaries,
        results: Vec<FetchResult<Status>>,
    ) {
        if !self.slots.finish(class, task_id) {
            tracing::debug!(class = class.label(), task_id, "stale fetch result ignored");
            return;
        }
        if let Some(error) = merge::first_error(&results) {
            self.surface_fetch_error(class, error);
        }

        let results = Arc::new(results);
        let notify = !boundaries.has_max_ids();

        let cache = self.clone();
        let cached = Arc::clone(&results);
        self.tasks.spawn(TaskTag::CacheUsers, async move {
            let db = cache.db.lock().await;
            if let Err(e) = merge::cache_users_and_statuses(&db, &cached) {
                tracing::debug!("caching users failed: {e:#}");
            }
        });

        let store = self.clone();
        self.tasks.spawn(TaskTag::Store(class), async move {
            let summary = {
                let db = store.db.lock().await;
                merge::store_statuses(&db, class.collection(), &results, notify)
            };
            store.report_merge(class, &summary);
        });
    }

    fn start_message_fetch<F, Fut>(
        &self,
        class: ResourceClass,
        boundaries: FetchBoundaries,
        fetch: F,
    ) -> TaskId
    where
        F: Fn(Arc<dyn RemoteClient>, Paging) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<DirectMessage>, ApiError>> + Send + 'static,
    {
        let limit = self.config().load_item_limit;
        let coordinator = self.clone();
        self.slots.replace(class, &self.tasks, || {
            self.tasks.spawn_with(TaskTag::Fetch(class), move |task_id| async move {
                let results =
                    fan_out(Arc::clone(&coordinator.resolver), &boundaries, limit, fetch).await;
                coordinator.finish_message_fetch(class, task_id, &boundaries, results);
            })
        })
    }

    fn finish_message_fetch(
        &self,
        class: ResourceClass,
        task_id: TaskId,
        boundaries: &FetchBoundaries,
        results: Vec<FetchResult<DirectMessage>>,
    ) {
        if !self.slots.finish(class, task_id) {
            tracing::debug!(class = class.label(), task_id, "stale fetch result ignored");
            return;
        }
        for error in results.iter().filter_map(|result| result.error.as_ref()) {
            self.surface_fetch_error(class, error);
        }

        let notify = !boundaries.has_max_ids();
        let store = self.clone();
        self.tasks.spawn(TaskTag::Store(class), async move {
            let summary = {
                let db = store.db.lock().await;
                merge::store_messages(&db, class.collection(), &results, notify)
            };
            store.report_merge(class, &summary);
        });
    }

    fn surface_fetch_error(&self, class: ResourceClass, error: &ApiError) {
        self.bus.notice(Notice::Error(format!(
            "Failed to refresh {}: {error}",
            class.label()
        )));
    }

    fn report_merge(&self, class: ResourceClass, summary: &MergeSummary) {
        for (account_id, cause) in &summary.failures {
            self.bus.notice(Notice::Error(format!(
                "Failed to store {} for account {account_id}: {cause}",
                class.label()
            )));
        }
        tracing::info!(
            class = class.label(),
            accounts = summary.merged_accounts.len(),
            inserted = summary.inserted,
            gaps = summary.gaps.len(),
            "merge finished"
        );
    }

    // ==================== Queries ====================

    /// Whether a fetch or merge of `class` is running
    pub fn is_refreshing(&self, class: ResourceClass) -> bool {
        self.tasks.has_running_tasks_for_tag(TaskTag::Fetch(class))
            || self.tasks.has_running_tasks_for_tag(TaskTag::Store(class))
    }

    /// Whether the home timeline is being fetched or merged
    pub fn is_home_timeline_refreshing(&self) -> bool {
        self.is_refreshing(ResourceClass::HomeTimeline)
    }

    /// Whether mentions are being fetched or merged
    pub fn is_mentions_refreshing(&self) -> bool {
        self.is_refreshing(ResourceClass::Mentions)
    }

    /// Whether received messages are being fetched or merged
    pub fn is_received_direct_messages_refreshing(&self) -> bool {
        self.is_refreshing(ResourceClass::ReceivedMessages)
    }

    /// Whether sent messages are being fetched or merged
    pub fn is_sent_direct_messages_refreshing(&self) -> bool {
        self.is_refreshing(ResourceClass::SentMessages)
    }

    /// Whether trends are being fetched or stored
    pub fn is_local_trends_refreshing(&self) -> bool {
        self.is_refreshing(ResourceClass::LocalTrends)
    }

    /// Cancel a background task by id
    pub fn cancel(&self, task_id: TaskId) -> bool {
        self.tasks.cancel(task_id)
    }

    /// Whether a favorite of the status is pending
    pub fn is_creating_favorite(&self, account_id: i64, status_id: i64) -> bool {
        self.mutations
            .creating_favorites
            .contains(account_id, status_id)
    }

    /// Whether an unfavorite of the status is pending
    pub fn is_destroying_favorite(&self, account_id: i64, status_id: i64) -> bool {
        self.mutations
            .destroying_favorites
            .contains(account_id, status_id)
    }

    /// Whether a retweet of the status is pending
    pub fn is_creating_retweet(&self, account_id: i64, status_id: i64) -> bool {
        self.mutations
            .creating_retweets
            .contains(account_id, status_id)
    }

    /// Whether a delete of the status is pending
    pub fn is_destroying_status(&self, account_id: i64, status_id: i64) -> bool {
        self.mutations
            .destroying_statuses
            .contains(account_id, status_id)
    }

    /// Whether a follow of the user is pending
    pub fn is_creating_friendship(&self, account_id: i64, user_id: i64) -> bool {
        self.mutations
            .creating_friendships
            .contains(account_id, user_id)
    }

    /// Whether an unfollow of the user is pending
    pub fn is_destroying_friendship(&self, account_id: i64, user_id: i64) -> bool {
        self.mutations
            .destroying_friendships
            .contains(account_id, user_id)
    }

    // ==================== Sending drafts ====================

    /// Mark a draft as being sent
    pub fn add_sending_draft_id(&self, id: Uuid) {
        self.drafts.add(id);
    }

    /// Unmark a draft
    pub fn remove_sending_draft_id(&self, id: Uuid) {
        self.drafts.remove(id);
    }

    /// Drafts currently being sent
    pub fn sending_draft_ids(&self) -> Vec<Uuid> {
        self.drafts.ids()
    }

    #[cfg(test)]
    pub(crate) async fn for_tests(resolver: Arc<dyn ClientResolver>) -> Self {
        Self::for_tests_with(resolver, Config::default()).await
    }

    #[cfg(test)]
    pub(crate) async fn for_tests_with(resolver: Arc<dyn ClientResolver>, config: Config) -> Self {
        let bus = EventBus::new();
        let db = Database::open_in_memory().unwrap().with_notifier(bus.clone());
        Self::new(resolver, Arc::new(Mutex::new(db)), bus, config)
    }
}
