//! Merging fetched pages into the local store
//!
//! Every page replaces the stored rows it overlaps (delete then insert), so
//! inserts behave as upserts. Status pages may additionally mark their oldest
//! row as a gap when contiguity with older stored rows cannot be proven.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::api::ApiError;
use crate::db::{Collection, Column, Database, Predicate};
use crate::models::{DirectMessage, Item, Status, Trends, User};

use super::fetch::FetchResult;

/// Inputs of the gap decision for one account's page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapCheck {
    /// Smallest id in the page
    pub min_id: i64,
    /// Stored rows deleted because the page overlapped them
    pub rows_deleted: usize,
    /// Rows were deleted and the page contains the requested max id
    pub deleted_old_gap: bool,
    /// The page was truncated at its since id
    pub truncated: bool,
    /// The account had no stored rows before this page
    pub no_items_before: bool,
    /// Items in the page
    pub page_len: usize,
}

impl GapCheck {
    /// Whether the oldest row of the page gets a gap marker
    pub const fn should_insert_gap(&self) -> bool {
        self.min_id > 0
            && (self.rows_deleted == 0 || self.deleted_old_gap)
            && !self.truncated
            && !self.no_items_before
            && self.page_len > 1
    }
}

/// What a merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Accounts whose rows were written
    pub merged_accounts: Vec<i64>,
    /// Rows inserted
    pub inserted: usize,
    /// Conflicting rows deleted
    pub deleted: usize,
    /// `(account id, item id)` of inserted gap markers
    pub gaps: Vec<(i64, i64)>,
    /// Accounts whose write failed, with the cause
    pub failures: Vec<(i64, String)>,
}

impl MergeSummary {
    fn record_failure(&mut self, account_id: i64, error: &anyhow::Error) {
        tracing::warn!(account_id, "merge failed: {error:#}");
        self.failures.push((account_id, format!("{error:#}")));
    }
}

/// Merge status pages into a status collection.
///
/// Accounts are merged independently; a failed account is recorded and the
/// remaining accounts are still merged.
pub fn store_statuses(
    db: &Database,
    collection: Collection,
    results: &[FetchResult<Status>],
    notify: bool,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    for result in results.iter().filter(|r| !r.items.is_empty()) {
        match merge_status_page(db, collection, result, notify) {
            Ok((deleted, gap)) => {
                summary.merged_accounts.push(result.account_id);
                summary.inserted += result.items.len();
                summary.deleted += deleted;
                if let Some(gap_id) = gap {
                    summary.gaps.push((result.account_id, gap_id));
                }
            }
            Err(e) => summary.record_failure(result.account_id, &e),
        }
    }
    tracing::debug!(
        table = collection.table(),
        inserted = summary.inserted,
        deleted = summary.deleted,
        gaps = summary.gaps.len(),
        "statuses merged"
    );
    summary
}

/// Returns conflicting rows deleted and the id marked as gap, if any
fn merge_status_page(
    db: &Database,
    collection: Collection,
    result: &FetchResult<Status>,
    notify: bool,
) -> Result<(usize, Option<i64>)> {
    let account = Predicate::account(result.account_id);
    let no_items_before = db.count_where(collection, &account)? == 0;

    let ids: Vec<i64> = result.items.iter().map(|status| status.id).collect();
    let min_id = ids.iter().copied().min().unwrap_or(-1);

    let conflicts = account.clone().and(Predicate::In(Column::ItemId, ids.clone()));
    let rows_deleted = db.delete_where(collection, &conflicts, false)?;
    db.insert_statuses(collection, &result.items, notify)?;

    let check = GapCheck {
        min_id,
        rows_deleted,
        deleted_old_gap: rows_deleted > 0
            && result
                .max_id
                .is_some_and(|max_id| result.items.iter().any(|item| item.paging_id() == max_id)),
        truncated: result.truncated,
        no_items_before,
        page_len: ids.len(),
    };
    if !check.should_insert_gap() {
        return Ok((rows_deleted, None));
    }

    db.update_where(
        collection,
        &[(Column::IsGap, Some(1))],
        &account.and(Predicate::Eq(Column::ItemId, min_id)),
        true,
    )?;
    tracing::debug!(account_id = result.account_id, status_id = min_id, "gap inserted");
    Ok((rows_deleted, Some(min_id)))
}

/// Merge direct message pages into the inbox or outbox
pub fn store_messages(
    db: &Database,
    collection: Collection,
    results: &[FetchResult<DirectMessage>],
    notify: bool,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    for result in results.iter().filter(|r| !r.items.is_empty()) {
        let ids: Vec<i64> = result.items.iter().map(|message| message.id).collect();
        let conflicts =
            Predicate::account(result.account_id).and(Predicate::In(Column::ItemId, ids));
        let merged = db
            .delete_where(collection, &conflicts, false)
            .and_then(|deleted| {
                db.insert_messages(collection, &result.items, notify)
                    .map(|_| deleted)
            });
        match merged {
            Ok(deleted) => {
                summary.merged_accounts.push(result.account_id);
                summary.inserted += result.items.len();
                summary.deleted += deleted;
            }
            Err(e) => summary.record_failure(result.account_id, &e),
        }
    }
    tracing::debug!(
        table = collection.table(),
        inserted = summary.inserted,
        "messages merged"
    );
    summary
}

/// Replace the local trends and refresh the hashtag cache
pub fn store_trends(db: &Database, trends: &Trends, notify: bool) -> Result<usize> {
    db.delete_where(Collection::LocalTrends, &Predicate::All, false)?;
    let inserted = db.insert_trends(trends, notify)?;

    let hashtags: Vec<String> = trends
        .trends
        .iter()
        .map(|trend| trend.hashtag().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    db.delete_hashtags(&hashtags, false)?;
    db.insert_hashtags(&hashtags, true)?;

    tracing::debug!(woeid = trends.woeid, inserted, "trends stored");
    Ok(inserted)
}

/// Cache the users and statuses referenced by fetched pages
pub fn cache_users_and_statuses(db: &Database, results: &[FetchResult<Status>]) -> Result<()> {
    let statuses: Vec<Status> = results
        .iter()
        .flat_map(|result| result.items.iter().cloned())
        .collect();
    if statuses.is_empty() {
        return Ok(());
    }

    // Mentions only carry a handle; full users are written after them
    let mut users: Vec<User> = statuses
        .iter()
        .flat_map(|status| status.mentions.iter())
        .map(|mention| User::new(mention.id, &mention.screen_name))
        .collect();
    for status in &statuses {
        users.push(status.user.clone());
        if let Some(retweeter) = &status.retweeted_by {
            users.push(retweeter.clone());
        }
    }

    db.cache_users(&users)?;
    db.cache_statuses(&statuses)?;
    Ok(())
}

/// First failure among status results (status fetches surface one error)
pub fn first_error<T>(results: &[FetchResult<T>]) -> Option<&ApiError> {
    results.iter().find_map(|result| result.error.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Trend, UserMention};
    use crate::testing::{message, status};
    use chrono::Utc;

    fn page(account_id: i64, ids: &[i64]) -> FetchResult<Status> {
        FetchResult {
            account_id,
            max_id: None,
            since_id: None,
            limit: 20,
            items: ids.iter().map(|&id| status(account_id, id)).collect(),
            truncated: false,
            error: None,
        }
    }

    fn gap_ids(db: &Database, account_id: i64) -> Vec<i64> {
        db.item_ids_where(
            Collection::HomeStatuses,
            &Predicate::account(account_id).and(Predicate::Eq(Column::IsGap, 1)),
        )
        .unwrap()
    }

    #[test]
    fn test_gap_check_never_marks_first_page_or_single_item() {
        let base = GapCheck {
            min_id: 10,
            rows_deleted: 0,
            deleted_old_gap: false,
            truncated: false,
            no_items_before: false,
            page_len: 5,
        };
        assert!(base.should_insert_gap());
        assert!(!GapCheck { no_items_before: true, ..base }.should_insert_gap());
        assert!(!GapCheck { page_len: 1, ..base }.should_insert_gap());
        assert!(!GapCheck { truncated: true, ..base }.should_insert_gap());
        assert!(!GapCheck { min_id: 0, ..base }.should_insert_gap());
        assert!(!GapCheck { rows_deleted: 2, ..base }.should_insert_gap());
        assert!(GapCheck {
            rows_deleted: 2,
            deleted_old_gap: true,
            ..base
        }
        .should_insert_gap());
    }

    #[test]
    fn test_merge_upserts_one_row_per_item() {
        let db = Database::open_in_memory().unwrap();
        let mut stale = status(1, 20);
        stale.text = "old".to_string();
        db.insert_statuses(Collection::HomeStatuses, &[stale], false)
            .unwrap();

        let mut fresh = page(1, &[30, 20]);
        fresh.items[1].text = "new".to_string();
        let summary = store_statuses(&db, Collection::HomeStatuses, &[fresh], false);

        assert_eq!(summary.deleted, 1);
        let stored = db
            .get_statuses(Collection::HomeStatuses, &Predicate::account(1), 10)
            .unwrap();
        assert_eq!(stored.iter().map(|s| s.id).collect::<Vec<_>>(), vec![30, 20]);
        assert_eq!(stored[1].text, "new");
    }

    #[test]
    fn test_disconnected_page_gets_gap_at_oldest_item() {
        let db = Database::open_in_memory().unwrap();
        db.insert_statuses(Collection::HomeStatuses, &[status(1, 5)], false)
            .unwrap();

        let summary = store_statuses(&db, Collection::HomeStatuses, &[page(1, &[50, 40, 30])], true);

        assert_eq!(summary.gaps, vec![(1, 30)]);
        assert_eq!(gap_ids(&db, 1), vec![30]);
    }

    #[test]
    fn test_overlapping_page_gets_no_gap() {
        let db = Database::open_in_memory().unwrap();
        db.insert_statuses(Collection::HomeStatuses, &[status(1, 30)], false)
            .unwrap();

        let summary = store_statuses(&db, Collection::HomeStatuses, &[page(1, &[50, 40, 30])], true);

        assert!(summary.gaps.is_empty());
        assert!(gap_ids(&db, 1).is_empty());
    }

    #[test]
    fn test_refetch_clears_old_gap_marker() {
        let db = Database::open_in_memory().unwrap();
        let mut gap = status(1, 30);
        gap.is_gap = true;
        db.insert_statuses(Collection::HomeStatuses, &[gap, status(1, 60)], false)
            .unwrap();

        // Overlaps 30 without containing the max id: replaced, no new gap
        let mut more = page(1, &[30, 20]);
        more.max_id = Some(31);
        store_statuses(&db, Collection::HomeStatuses, &[more], false);

        assert!(gap_ids(&db, 1).is_empty());
    }

    #[test]
    fn test_refetch_from_gap_row_marks_new_oldest_row() {
        let db = Database::open_in_memory().unwrap();
        let mut gap = status(1, 30);
        gap.is_gap = true;
        db.insert_statuses(Collection::HomeStatuses, &[status(1, 60), gap], false)
            .unwrap();

        // Starts at the gap row itself: the old marker is replaced one page down
        let mut more = page(1, &[30, 25, 20]);
        more.max_id = Some(30);
        let summary = store_statuses(&db, Collection::HomeStatuses, &[more], false);

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.gaps, vec![(1, 20)]);
        assert_eq!(gap_ids(&db, 1), vec![20]);
    }

    #[test]
    fn test_scenario_two_accounts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_statuses(Collection::HomeStatuses, &[status(1, 90)], false)
            .unwrap();

        let mut first = page(1, &[105, 103, 101]);
        first.since_id = Some(100);
        let second = page(2, &[50, 40]);

        let summary = store_statuses(&db, Collection::HomeStatuses, &[first, second], true);

        assert_eq!(summary.inserted, 5);
        assert_eq!(summary.merged_accounts, vec![1, 2]);
        assert_eq!(
            db.count_where(Collection::HomeStatuses, &Predicate::accounts(&[1, 2]))
                .unwrap(),
            6
        );
        assert!(gap_ids(&db, 2).is_empty());
        assert_eq!(gap_ids(&db, 1), vec![101]);
    }

    #[test]
    fn test_failed_results_are_not_merged() {
        let db = Database::open_in_memory().unwrap();
        let mut failed = page(1, &[]);
        failed.error = Some(ApiError::Transport("down".to_string()));

        let summary = store_statuses(&db, Collection::HomeStatuses, &[failed, page(2, &[7])], true);

        assert_eq!(summary.merged_accounts, vec![2]);
    }

    #[test]
    fn test_first_error_skips_successful_results() {
        let mut failed = page(2, &[]);
        failed.error = Some(ApiError::Transport("down".to_string()));

        assert_eq!(first_error(&[page(1, &[1])]), None);
        assert_eq!(
            first_error(&[page(1, &[1]), failed]),
            Some(&ApiError::Transport("down".to_string()))
        );
    }

    #[test]
    fn test_messages_replace_conflicts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_messages(Collection::Inbox, &[message(1, 3)], false)
            .unwrap();

        let result = FetchResult {
            account_id: 1,
            max_id: None,
            since_id: None,
            limit: 20,
            items: vec![message(1, 4), message(1, 3)],
            truncated: false,
            error: None,
        };
        let summary = store_messages(&db, Collection::Inbox, &[result], true);

        assert_eq!(summary.deleted, 1);
        assert_eq!(
            db.item_ids_where(Collection::Inbox, &Predicate::account(1))
                .unwrap(),
            vec![4, 3]
        );
    }

    #[test]
    fn test_trends_replace_table_and_cache_hashtags() {
        let db = Database::open_in_memory().unwrap();
        let trend = |name: &str| Trend {
            name: name.to_string(),
            query: name.to_string(),
            url: None,
        };
        let old = Trends {
            woeid: 1,
            as_of: Utc::now(),
            trends: vec![trend("#old")],
        };
        store_trends(&db, &old, false).unwrap();

        let new = Trends {
            woeid: 1,
            as_of: Utc::now(),
            trends: vec![trend("#rust"), trend("rust"), trend("Weather")],
        };
        assert_eq!(store_trends(&db, &new, true).unwrap(), 3);

        assert_eq!(db.get_trends().unwrap().len(), 3);
        assert_eq!(
            db.get_hashtags().unwrap(),
            vec!["Weather".to_string(), "old".to_string(), "rust".to_string()]
        );
    }

    #[test]
    fn test_cache_prefers_full_user_over_mention() {
        let db = Database::open_in_memory().unwrap();
        let mut result = page(1, &[10]);
        result.items[0].mentions.push(UserMention {
            id: 900,
            screen_name: "author-mention".to_string(),
        });

        cache_users_and_statuses(&db, &[result]).unwrap();

        let cached = db.get_cached_user(900).unwrap().unwrap();
        assert_eq!(cached.screen_name, "author");
        assert_eq!(
            db.count_where(Collection::CachedStatuses, &Predicate::All)
                .unwrap(),
            1
        );
    }
}
