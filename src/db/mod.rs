//! Database module for `SQLite` storage (accounts, timelines, messages, trends, caches, drafts)
//!
//! Timeline-like tables share an `(account_id, item_id)` key and are addressed
//! through [`Collection`] and [`Predicate`], so the sync layer can delete,
//! update and count rows without knowing table layouts. Every write takes a
//! `notify` flag; when set, a [`DomainEvent::CollectionChanged`] is published
//! to the attached [`EventBus`].

mod predicate;
mod rows;

pub use predicate::{Column, Predicate};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params, params_from_iter};
use std::path::Path;
use uuid::Uuid;

use crate::events::{DomainEvent, EventBus};
use crate::models::{Account, DirectMessage, Draft, Status, Trend, Trends, User};
use crate::paths;

/// Addressable local collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Home timeline statuses
    HomeStatuses,
    /// Mention statuses
    Mentions,
    /// Received direct messages
    Inbox,
    /// Sent direct messages
    Outbox,
    /// Trends of the configured region
    LocalTrends,
    /// Hashtags seen in trends
    CachedHashtags,
    /// Users referenced by stored statuses
    CachedUsers,
    /// Statuses referenced by stored statuses
    CachedStatuses,
    /// Unsent drafts
    Drafts,
    /// Signed-in accounts
    Accounts,
}

/// Collections holding [`Status`] rows
pub const STATUS_COLLECTIONS: [Collection; 3] = [
    Collection::HomeStatuses,
    Collection::Mentions,
    Collection::CachedStatuses,
];

/// Collections holding [`DirectMessage`] rows
pub const MESSAGE_COLLECTIONS: [Collection; 2] = [Collection::Inbox, Collection::Outbox];

impl Collection {
    /// Backing table
    pub const fn table(self) -> &'static str {
        match self {
            Self::HomeStatuses => "statuses",
            Self::Mentions => "mentions",
            Self::Inbox => "inbox_messages",
            Self::Outbox => "outbox_messages",
            Self::LocalTrends => "local_trends",
            Self::CachedHashtags => "cached_hashtags",
            Self::CachedUsers => "cached_users",
            Self::CachedStatuses => "cached_statuses",
            Self::Drafts => "drafts",
            Self::Accounts => "accounts",
        }
    }

    /// Whether rows are keyed by `(account_id, item_id)`
    pub const fn is_item_table(self) -> bool {
        matches!(
            self,
            Self::HomeStatuses | Self::Mentions | Self::CachedStatuses | Self::Inbox | Self::Outbox
        )
    }
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
    notifier: Option<EventBus>,
}

impl Database {
    /// Open or create the database at the default location
    pub fn open() -> Result<Self> {
        let path = paths::database_path()?;
        Self::open_path(&path)
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::from_connection(conn)
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn,
            notifier: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Publish change notifications for notifying writes to `bus`
    #[must_use]
    pub fn with_notifier(mut self, bus: EventBus) -> Self {
        self.notifier = Some(bus);
        self
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let status_table = |name: &str| {
            format!(
                r"
                CREATE TABLE IF NOT EXISTS {name} (
                    account_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    user_json TEXT NOT NULL,
                    text TEXT NOT NULL,
                    text_html TEXT,
                    created_at TEXT NOT NULL,
                    url TEXT,
                    retweet_id INTEGER,
                    retweeted_by_json TEXT,
                    my_retweet_id INTEGER,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    is_gap INTEGER NOT NULL DEFAULT 0,
                    favorite_count INTEGER NOT NULL DEFAULT 0,
                    retweet_count INTEGER NOT NULL DEFAULT 0,
                    reply_count INTEGER NOT NULL DEFAULT 0,
                    in_reply_to_status_id INTEGER,
                    mentions_json TEXT NOT NULL DEFAULT '[]',
                    paging_id INTEGER,
                    UNIQUE(account_id, item_id)
                );
                CREATE INDEX IF NOT EXISTS idx_{name}_user ON {name}(account_id, user_id);
                "
            )
        };
        let message_table = |name: &str| {
            format!(
                r"
                CREATE TABLE IF NOT EXISTS {name} (
                    account_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    sender_json TEXT NOT NULL,
                    recipient_json TEXT NOT NULL,
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    is_outgoing INTEGER NOT NULL DEFAULT 0,
                    paging_id INTEGER,
                    UNIQUE(account_id, item_id)
                );
                "
            )
        };

        let mut schema = String::new();
        for collection in STATUS_COLLECTIONS {
            schema.push_str(&status_table(collection.table()));
        }
        for collection in MESSAGE_COLLECTIONS {
            schema.push_str(&message_table(collection.table()));
        }
        schema.push_str(
            r"
            -- Accounts table
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                display_name TEXT NOT NULL,
                handle TEXT NOT NULL,
                server TEXT NOT NULL,
                is_activated INTEGER NOT NULL DEFAULT 1,
                is_default INTEGER NOT NULL DEFAULT 0,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            );

            -- Trends of the configured region, most popular first
            CREATE TABLE IF NOT EXISTS local_trends (
                position INTEGER NOT NULL,
                woeid INTEGER NOT NULL,
                as_of TEXT NOT NULL,
                name TEXT NOT NULL,
                query TEXT NOT NULL,
                url TEXT
            );

            CREATE TABLE IF NOT EXISTS cached_hashtags (
                name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS cached_users (
                user_id INTEGER PRIMARY KEY,
                screen_name TEXT NOT NULL,
                name TEXT NOT NULL,
                avatar_url TEXT,
                is_protected INTEGER NOT NULL DEFAULT 0
            );

            -- Drafts table
            CREATE TABLE IF NOT EXISTS drafts (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                account_ids TEXT NOT NULL,
                in_reply_to_status_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_default ON accounts(is_default);
            ",
        );

        self.conn
            .execute_batch(&schema)
            .context("Failed to initialize schema")?;
        Ok(())
    }

    fn notify_changed(&self, collection: Collection, notify: bool) {
        if !notify {
            return;
        }
        if let Some(bus) = &self.notifier {
            bus.publish(DomainEvent::CollectionChanged(collection));
        }
    }

    // ==================== Generic collection ops ====================

    /// Delete rows matching `predicate`, returning how many were removed
    pub fn delete_where(
        &self,
        collection: Collection,
        predicate: &Predicate,
        notify: bool,
    ) -> Result<usize> {
        let (clause, values) = predicate.to_sql();
        let sql = format!("DELETE FROM {} WHERE {clause}", collection.table());
        let deleted = self
            .conn
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("Failed to delete from {}", collection.table()))?;
        self.notify_changed(collection, notify);
        Ok(deleted)
    }

    /// Set integer columns on rows matching `predicate`; `None` writes NULL
    pub fn update_where(
        &self,
        collection: Collection,
        values: &[(Column, Option<i64>)],
        predicate: &Predicate,
        notify: bool,
    ) -> Result<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let assignments = values
            .iter()
            .map(|(column, _)| format!("{} = ?", column.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let (clause, where_values) = predicate.to_sql();
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {clause}",
            collection.table()
        );

        let mut bound: Vec<Option<i64>> = values.iter().map(|(_, value)| *value).collect();
        bound.extend(where_values.into_iter().map(Some));

        let updated = self
            .conn
            .execute(&sql, params_from_iter(bound))
            .with_context(|| format!("Failed to update {}", collection.table()))?;
        self.notify_changed(collection, notify);
        Ok(updated)
    }

    /// Count rows matching `predicate`
    pub fn count_where(&self, collection: Collection, predicate: &Predicate) -> Result<usize> {
        let (clause, values) = predicate.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", collection.table());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Item ids of rows matching `predicate`, newest first
    pub fn item_ids_where(&self, collection: Collection, predicate: &Predicate) -> Result<Vec<i64>> {
        let (clause, values) = predicate.to_sql();
        let sql = format!(
            "SELECT item_id FROM {} WHERE {clause} ORDER BY item_id DESC",
            collection.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt.query_map(params_from_iter(values), |row| row.get(0))?;
        ids.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Newest stored paging id per account, in account order; `-1` when none.
    ///
    /// Rows without a separate paging id page by their item id.
    pub fn newest_paging_ids(&self, collection: Collection, account_ids: &[i64]) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT MAX(COALESCE(paging_id, item_id)) FROM {} WHERE account_id = ?1",
            collection.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        account_ids
            .iter()
            .map(|account_id| {
                let newest: Option<i64> = stmt.query_row(params![account_id], |row| row.get(0))?;
                Ok(newest.unwrap_or(-1))
            })
            .collect()
    }

    // ==================== Statuses ====================

    /// Insert or replace statuses, returning how many were written
    pub fn insert_statuses(
        &self,
        collection: Collection,
        statuses: &[Status],
        notify: bool,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let sql = format!(
                r"INSERT OR REPLACE INTO {}
                   (account_id, item_id, user_id, user_json, text, text_html, created_at, url,
                    retweet_id, retweeted_by_json, my_retweet_id, is_favorite, is_gap,
                    favorite_count, retweet_count, reply_count, in_reply_to_status_id, mentions_json,
                    paging_id)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                collection.table()
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            for status in statuses {
                stmt.execute(params![
                    status.account_id,
                    status.id,
                    status.user.id,
                    serde_json::to_string(&status.user)?,
                    status.text,
                    status.text_html,
                    status.created_at.to_rfc3339(),
                    status.url,
                    status.retweet_id,
                    status
                        .retweeted_by
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    status.my_retweet_id,
                    i32::from(status.is_favorite),
                    i32::from(status.is_gap),
                    status.favorite_count,
                    status.retweet_count,
                    status.reply_count,
                    status.in_reply_to_status_id,
                    serde_json::to_string(&status.mentions)?,
                    status.paging_id,
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to insert into {}", collection.table()))?;
        self.notify_changed(collection, notify);
        Ok(statuses.len())
    }

    /// Statuses matching `predicate`, newest first
    pub fn get_statuses(
        &self,
        collection: Collection,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<Status>> {
        let (clause, values) = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause} ORDER BY item_id DESC LIMIT {limit}",
            rows::STATUS_COLUMNS,
            collection.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let statuses = stmt.query_map(params_from_iter(values), rows::status)?;
        statuses.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Direct messages ====================

    /// Insert or replace direct messages, returning how many were written
    pub fn insert_messages(
        &self,
        collection: Collection,
        messages: &[DirectMessage],
        notify: bool,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let sql = format!(
                r"INSERT OR REPLACE INTO {}
                   (account_id, item_id, user_id, sender_json, recipient_json, text, created_at, is_outgoing,
                    paging_id)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                collection.table()
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            for message in messages {
                stmt.execute(params![
                    message.account_id,
                    message.id,
                    message.sender.id,
                    serde_json::to_string(&message.sender)?,
                    serde_json::to_string(&message.recipient)?,
                    message.text,
                    message.created_at.to_rfc3339(),
                    i32::from(message.is_outgoing),
                    message.paging_id,
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to insert into {}", collection.table()))?;
        self.notify_changed(collection, notify);
        Ok(messages.len())
    }

    /// Direct messages matching `predicate`, newest first
    pub fn get_messages(
        &self,
        collection: Collection,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<DirectMessage>> {
        let (clause, values) = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause} ORDER BY item_id DESC LIMIT {limit}",
            rows::MESSAGE_COLUMNS,
            collection.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let messages = stmt.query_map(params_from_iter(values), rows::message)?;
        messages.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Trends ====================

    /// Append trends to the local trends table
    pub fn insert_trends(&self, trends: &Trends, notify: bool) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r"INSERT INTO local_trends (position, woeid, as_of, name, query, url)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, trend) in trends.trends.iter().enumerate() {
                stmt.execute(params![
                    i64::try_from(position).unwrap_or(i64::MAX),
                    trends.woeid,
                    trends.as_of.to_rfc3339(),
                    trend.name,
                    trend.query,
                    trend.url,
                ])?;
            }
        }
        tx.commit().context("Failed to insert trends")?;
        self.notify_changed(Collection::LocalTrends, notify);
        Ok(trends.trends.len())
    }

    /// Stored trends, most popular first
    pub fn get_trends(&self) -> Result<Vec<Trend>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, query, url FROM local_trends ORDER BY position")?;
        let trends = stmt.query_map([], rows::trend)?;
        trends.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert hashtags (without `#`) that are not yet cached
    pub fn insert_hashtags(&self, hashtags: &[String], notify: bool) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO cached_hashtags (name) VALUES (?1)")?;
            for hashtag in hashtags {
                inserted += stmt.execute(params![hashtag])?;
            }
        }
        tx.commit().context("Failed to insert hashtags")?;
        self.notify_changed(Collection::CachedHashtags, notify);
        Ok(inserted)
    }

    /// Delete the given hashtags from the cache
    pub fn delete_hashtags(&self, hashtags: &[String], notify: bool) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM cached_hashtags WHERE name = ?1")?;
            for hashtag in hashtags {
                deleted += stmt.execute(params![hashtag])?;
            }
        }
        tx.commit().context("Failed to delete hashtags")?;
        self.notify_changed(Collection::CachedHashtags, notify);
        Ok(deleted)
    }

    /// Cached hashtags, alphabetically
    pub fn get_hashtags(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM cached_hashtags ORDER BY name")?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Caches ====================

    /// Insert or replace users in the user cache
    pub fn cache_users(&self, users: &[User]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r"INSERT OR REPLACE INTO cached_users (user_id, screen_name, name, avatar_url, is_protected)
                   VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for user in users {
                stmt.execute(params![
                    user.id,
                    user.screen_name,
                    user.name,
                    user.avatar_url,
                    i32::from(user.is_protected),
                ])?;
            }
        }
        tx.commit().context("Failed to cache users")?;
        Ok(users.len())
    }

    /// Look up a cached user
    pub fn get_cached_user(&self, user_id: i64) -> Result<Option<User>> {
        let result = self.conn.query_row(
            "SELECT user_id, screen_name, name, avatar_url, is_protected FROM cached_users WHERE user_id = ?1",
            params![user_id],
            rows::user,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace statuses in the status cache
    pub fn cache_statuses(&self, statuses: &[Status]) -> Result<usize> {
        self.insert_statuses(Collection::CachedStatuses, statuses, false)
    }

    // ==================== Drafts ====================

    /// Save (insert or replace) a draft
    pub fn save_draft(&self, draft: &Draft) -> Result<()> {
        self.conn.execute(
            r"INSERT OR REPLACE INTO drafts (id, text, account_ids, in_reply_to_status_id, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.id.to_string(),
                draft.text,
                draft.account_ids_str(),
                draft.in_reply_to_status_id,
                draft.created_at.to_rfc3339(),
                draft.updated_at.to_rfc3339(),
            ],
        )?;
        self.notify_changed(Collection::Drafts, true);
        Ok(())
    }

    /// All drafts, most recently edited first
    pub fn get_drafts(&self) -> Result<Vec<Draft>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, text, account_ids, in_reply_to_status_id, created_at, updated_at
             FROM drafts ORDER BY updated_at DESC",
        )?;
        let drafts = stmt.query_map([], rows::draft)?;
        drafts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a draft
    pub fn delete_draft(&self, id: Uuid) -> Result<()> {
        self.conn
            .execute("DELETE FROM drafts WHERE id = ?1", params![id.to_string()])?;
        self.notify_changed(Collection::Drafts, true);
        Ok(())
    }

    // ==================== Accounts ====================

    /// Insert a new account, returning its local id
    pub fn insert_account(&self, account: &Account) -> Result<i64> {
        self.conn.execute(
            r"INSERT INTO accounts (user_id, display_name, handle, server, is_activated, is_default, avatar_url, created_at, last_used_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                account.user_id,
                account.display_name,
                account.handle,
                account.server,
                i32::from(account.is_activated),
                i32::from(account.is_default),
                account.avatar_url,
                account.created_at.to_rfc3339(),
                account.last_used_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify_changed(Collection::Accounts, true);
        Ok(id)
    }

    /// Get all accounts, in insertion order
    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts ORDER BY id",
            rows::ACCOUNT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let accounts = stmt.query_map([], rows::account)?;
        accounts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Get one account by local id
    pub fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", rows::ACCOUNT_COLUMNS);
        let result = self.conn.query_row(&sql, params![id], rows::account);

        match result {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Local ids of activated accounts, in insertion order
    pub fn activated_account_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM accounts WHERE is_activated = 1 ORDER BY id")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The default account, falling back to the first activated one
    pub fn get_default_account(&self) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts ORDER BY is_default DESC, is_activated DESC, id LIMIT 1",
            rows::ACCOUNT_COLUMNS
        );
        let result = self.conn.query_row(&sql, [], rows::account);

        match result {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Make an account the only default one
    pub fn set_default_account(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("UPDATE accounts SET is_default = 0", [])?;
        tx.execute(
            "UPDATE accounts SET is_default = 1 WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        self.notify_changed(Collection::Accounts, true);
        Ok(())
    }

    /// Include or exclude an account from refreshes
    pub fn set_account_activated(&self, id: i64, activated: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE accounts SET is_activated = ?2 WHERE id = ?1",
            params![id, i32::from(activated)],
        )?;
        self.notify_changed(Collection::Accounts, true);
        Ok(())
    }

    /// Delete an account and everything stored for it
    pub fn delete_account(&self, id: i64) -> Result<()> {
        let predicate = Predicate::account(id);
        for collection in STATUS_COLLECTIONS.into_iter().chain(MESSAGE_COLLECTIONS) {
            self.delete_where(collection, &predicate, false)?;
        }
        self.conn
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        self.notify_changed(Collection::Accounts, true);
        Ok(())
    }

    /// Update last used timestamp
    pub fn update_account_last_used(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE accounts SET last_used_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Notice};
    use crate::testing::status;
    use tempfile::tempdir;

    #[test]
    fn test_database_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let db = Database::open_path(&db_path).unwrap();
        assert!(db.get_accounts().unwrap().is_empty());
        assert!(db_path.exists());
    }

    #[test]
    fn test_account_crud() {
        let dir = tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("test.sqlite")).unwrap();

        let first = db
            .insert_account(&Account::new(11, "alice", "https://a.social", "Alice"))
            .unwrap();
        let mut inactive = Account::new(12, "bob", "https://b.social", "Bob");
        inactive.is_activated = false;
        let second = db.insert_account(&inactive).unwrap();

        assert_eq!(db.get_accounts().unwrap().len(), 2);
        assert_eq!(db.activated_account_ids().unwrap(), vec![first]);

        db.set_default_account(second).unwrap();
        let default = db.get_default_account().unwrap().unwrap();
        assert_eq!(default.id, second);
        assert_eq!(default.handle, "bob");

        db.delete_account(second).unwrap();
        assert!(db.get_account(second).unwrap().is_none());
        assert_eq!(db.get_default_account().unwrap().unwrap().id, first);
    }

    #[test]
    fn test_insert_is_upsert_per_account() {
        let db = Database::open_in_memory().unwrap();
        let mut original = status(1, 10);
        db.insert_statuses(Collection::HomeStatuses, &[original.clone(), status(2, 10)], false)
            .unwrap();

        original.text = "edited".to_string();
        db.insert_statuses(Collection::HomeStatuses, &[original], false)
            .unwrap();

        let stored = db
            .get_statuses(Collection::HomeStatuses, &Predicate::account(1), 10)
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "edited");
        assert_eq!(
            db.count_where(Collection::HomeStatuses, &Predicate::All)
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_update_and_delete_by_predicate() {
        let db = Database::open_in_memory().unwrap();
        let mut retweet = status(1, 20);
        retweet.retweet_id = Some(10);
        db.insert_statuses(Collection::HomeStatuses, &[status(1, 10), retweet], false)
            .unwrap();

        let by_id_or_retweet = Predicate::account(1).and(
            Predicate::Eq(Column::ItemId, 10).or(Predicate::Eq(Column::RetweetId, 10)),
        );
        let updated = db
            .update_where(
                Collection::HomeStatuses,
                &[(Column::IsFavorite, Some(1))],
                &by_id_or_retweet,
                false,
            )
            .unwrap();
        assert_eq!(updated, 2);

        let favorites = Predicate::Eq(Column::IsFavorite, 1);
        assert_eq!(
            db.count_where(Collection::HomeStatuses, &favorites).unwrap(),
            2
        );

        let deleted = db
            .delete_where(
                Collection::HomeStatuses,
                &Predicate::In(Column::ItemId, vec![20, 99]),
                false,
            )
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            db.item_ids_where(Collection::HomeStatuses, &Predicate::All)
                .unwrap(),
            vec![10]
        );
    }

    #[test]
    fn test_newest_paging_ids_prefer_notification_ids() {
        let db = Database::open_in_memory().unwrap();
        let mut mention = status(1, 110_000_000_000_000_000);
        mention.paging_id = Some(5_000);
        db.insert_statuses(Collection::Mentions, &[mention, status(2, 40)], false)
            .unwrap();

        assert_eq!(
            db.newest_paging_ids(Collection::Mentions, &[1, 2, 3]).unwrap(),
            vec![5_000, 40, -1]
        );
        let stored = db
            .get_statuses(Collection::Mentions, &Predicate::account(1), 10)
            .unwrap();
        assert_eq!(stored[0].paging_id, Some(5_000));
    }

    #[test]
    fn test_trends_and_hashtags() {
        let db = Database::open_in_memory().unwrap();
        let trends = Trends {
            woeid: 1,
            as_of: Utc::now(),
            trends: vec![
                Trend {
                    name: "#rust".to_string(),
                    query: "rust".to_string(),
                    url: None,
                },
                Trend {
                    name: "Weather".to_string(),
                    query: "Weather".to_string(),
                    url: None,
                },
            ],
        };
        db.insert_trends(&trends, false).unwrap();
        assert_eq!(db.get_trends().unwrap(), trends.trends);

        let tags = vec!["rust".to_string(), "rust".to_string()];
        assert_eq!(db.insert_hashtags(&tags, false).unwrap(), 1);
        assert_eq!(db.get_hashtags().unwrap(), vec!["rust".to_string()]);
    }

    #[test]
    fn test_draft_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let draft = Draft::new("hello", vec![1, 2]);
        db.save_draft(&draft).unwrap();
        assert_eq!(db.get_drafts().unwrap(), vec![draft.clone()]);
        db.delete_draft(draft.id).unwrap();
        assert!(db.get_drafts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_flag_controls_change_events() {
        let bus = EventBus::new();
        let mut store_events = bus.subscribe(EventKind::Store);
        let db = Database::open_in_memory().unwrap().with_notifier(bus.clone());

        db.insert_statuses(Collection::HomeStatuses, &[status(1, 1)], false)
            .unwrap();
        db.insert_statuses(Collection::Mentions, &[status(1, 2)], true)
            .unwrap();
        bus.notice(Notice::Info("unrelated".to_string()));

        let event = store_events.recv().await.unwrap();
        assert_eq!(event, DomainEvent::CollectionChanged(Collection::Mentions));
        assert!(store_events.try_recv().is_err());
    }
}
