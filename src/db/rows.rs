//! Row mappers shared by the collection queries

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{Account, DirectMessage, Draft, Status, Trend, User};

/// Columns selected by [`status`], in order
pub const STATUS_COLUMNS: &str = "account_id, item_id, user_json, text, text_html, created_at, url, \
     retweet_id, retweeted_by_json, my_retweet_id, is_favorite, is_gap, favorite_count, \
     retweet_count, reply_count, in_reply_to_status_id, mentions_json, paging_id";

/// Columns selected by [`message`], in order
pub const MESSAGE_COLUMNS: &str =
    "account_id, item_id, sender_json, recipient_json, text, created_at, is_outgoing, paging_id";

/// Columns selected by [`account`], in order
pub const ACCOUNT_COLUMNS: &str = "id, user_id, display_name, handle, server, is_activated, \
     is_default, avatar_url, created_at, last_used_at";

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

pub fn status(row: &Row<'_>) -> rusqlite::Result<Status> {
    let retweeted_by: Option<String> = row.get(8)?;
    let retweeted_by = retweeted_by
        .map(|text| serde_json::from_str::<User>(&text))
        .transpose()
        .map_err(|e| conversion_error(8, e))?;

    Ok(Status {
        account_id: row.get(0)?,
        id: row.get(1)?,
        user: json_column(row, 2)?,
        text: row.get(3)?,
        text_html: row.get(4)?,
        created_at: time_column(row, 5)?,
        url: row.get(6)?,
        retweet_id: row.get(7)?,
        retweeted_by,
        my_retweet_id: row.get(9)?,
        is_favorite: row.get::<_, i32>(10)? != 0,
        is_gap: row.get::<_, i32>(11)? != 0,
        favorite_count: row.get(12)?,
        retweet_count: row.get(13)?,
        reply_count: row.get(14)?,
        in_reply_to_status_id: row.get(15)?,
        mentions: json_column(row, 16)?,
        paging_id: row.get(17)?,
    })
}

pub fn message(row: &Row<'_>) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        account_id: row.get(0)?,
        id: row.get(1)?,
        sender: json_column(row, 2)?,
        recipient: json_column(row, 3)?,
        text: row.get(4)?,
        created_at: time_column(row, 5)?,
        is_outgoing: row.get::<_, i32>(6)? != 0,
        paging_id: row.get(7)?,
    })
}

pub fn trend(row: &Row<'_>) -> rusqlite::Result<Trend> {
    Ok(Trend {
        name: row.get(0)?,
        query: row.get(1)?,
        url: row.get(2)?,
    })
}

pub fn user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        screen_name: row.get(1)?,
        name: row.get(2)?,
        avatar_url: row.get(3)?,
        is_protected: row.get::<_, i32>(4)? != 0,
    })
}

pub fn account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        display_name: row.get(2)?,
        handle: row.get(3)?,
        server: row.get(4)?,
        is_activated: row.get::<_, i32>(5)? != 0,
        is_default: row.get::<_, i32>(6)? != 0,
        avatar_url: row.get(7)?,
        created_at: time_column(row, 8)?,
        last_used_at: optional_time_column(row, 9)?,
    })
}

pub fn draft(row: &Row<'_>) -> rusqlite::Result<Draft> {
    let id: String = row.get(0)?;
    let account_ids: String = row.get(2)?;
    Ok(Draft {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        text: row.get(1)?,
        account_ids: Draft::account_ids_from_str(&account_ids),
        in_reply_to_status_id: row.get(3)?,
        created_at: time_column(row, 4)?,
        updated_at: time_column(row, 5)?,
    })
}
