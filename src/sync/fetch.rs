//! Per-account page fetches and the fan-out across accounts

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::api::{ApiError, ClientResolver, Paging, RemoteClient};
use crate::models::Item;

/// Outcome of one account's page fetch
#[derive(Debug, Clone)]
pub struct FetchResult<T> {
    /// Account the page was fetched for
    pub account_id: i64,
    /// Exclusive upper bound that was requested
    pub max_id: Option<i64>,
    /// Exclusive lower bound that was requested
    pub since_id: Option<i64>,
    /// Requested page size
    pub limit: usize,
    /// Items newest first, all with a paging id above `since_id`
    pub items: Vec<T>,
    /// Items at or below `since_id` were dropped from the page
    pub truncated: bool,
    /// Why the fetch failed; `items` is empty when set
    pub error: Option<ApiError>,
}

impl<T> FetchResult<T> {
    fn failed(
        account_id: i64,
        max_id: Option<i64>,
        since_id: Option<i64>,
        limit: usize,
        error: ApiError,
    ) -> Self {
        Self {
            account_id,
            max_id,
            since_id,
            limit,
            items: Vec::new(),
            truncated: false,
            error: Some(error),
        }
    }

    /// Whether the remote call succeeded
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Accounts to fan out over, with optional per-account page bounds.
///
/// Bound arrays whose length differs from the account list are ignored as a
/// whole, and non-positive entries mean "no bound" for that account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchBoundaries {
    account_ids: Vec<i64>,
    max_ids: Option<Vec<i64>>,
    since_ids: Option<Vec<i64>>,
}

impl FetchBoundaries {
    /// Bounds for `account_ids`, dropping arrays of the wrong length
    pub fn new(account_ids: Vec<i64>, max_ids: Option<Vec<i64>>, since_ids: Option<Vec<i64>>) -> Self {
        let valid = |ids: Option<Vec<i64>>| ids.filter(|ids| ids.len() == account_ids.len());
        let max_ids = valid(max_ids);
        let since_ids = valid(since_ids);
        Self {
            account_ids,
            max_ids,
            since_ids,
        }
    }

    /// Accounts without any bounds
    pub fn unbounded(account_ids: Vec<i64>) -> Self {
        Self::new(account_ids, None, None)
    }

    /// Accounts in fan-out order
    pub fn account_ids(&self) -> &[i64] {
        &self.account_ids
    }

    /// Whether a valid max-id array was given ("load more" rather than refresh)
    pub const fn has_max_ids(&self) -> bool {
        self.max_ids.is_some()
    }

    /// Upper bound for the account at `index`
    pub fn max_id(&self, index: usize) -> Option<i64> {
        Self::bound(self.max_ids.as_deref(), index)
    }

    /// Lower bound for the account at `index`
    pub fn since_id(&self, index: usize) -> Option<i64> {
        Self::bound(self.since_ids.as_deref(), index)
    }

    fn bound(ids: Option<&[i64]>, index: usize) -> Option<i64> {
        ids.and_then(|ids| ids.get(index).copied())
            .filter(|id| *id > 0)
    }
}

/// Keep items whose paging id is strictly above `since_id`.
///
/// Returns the kept items and whether anything was dropped.
pub fn truncate_items<T: Item>(items: Vec<T>, since_id: Option<i64>) -> (Vec<T>, bool) {
    let Some(since_id) = since_id else {
        return (items, false);
    };
    let before = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| item.paging_id() > since_id)
        .collect();
    let truncated = kept.len() < before;
    (kept, truncated)
}

/// Fetch one page for one account.
///
/// Returns `None` when the account has no client. The remote API treats
/// `since_id` as inclusive, so the request asks for `since_id - 1` and the
/// page is truncated locally.
pub async fn fetch_account_page<T, F, Fut>(
    resolver: &dyn ClientResolver,
    account_id: i64,
    max_id: Option<i64>,
    since_id: Option<i64>,
    limit: usize,
    fetch: F,
) -> Option<FetchResult<T>>
where
    T: Item,
    F: FnOnce(Arc<dyn RemoteClient>, Paging) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ApiError>>,
{
    let Some(client) = resolver.client_for(account_id).await else {
        tracing::debug!(account_id, "no client, skipping account");
        return None;
    };

    let mut paging = Paging::new().count(limit);
    if let Some(max_id) = max_id {
        paging = paging.max_id(max_id);
    }
    if let Some(since_id) = since_id {
        paging = paging.since_id(since_id - 1);
    }

    let result = match fetch(client, paging).await {
        Ok(mut items) => {
            for item in &mut items {
                item.assign_account(account_id);
            }
            let (items, truncated) = truncate_items(items, since_id);
            FetchResult {
                account_id,
                max_id,
                since_id,
                limit,
                items,
                truncated,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(account_id, "fetch failed: {e}");
            FetchResult::failed(account_id, max_id, since_id, limit, e)
        }
    };
    Some(result)
}

/// Aborts still-running per-account fetches when the fan-out is dropped
struct AbortOnDrop<T>(Vec<JoinHandle<T>>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Fetch a page for every account concurrently.
///
/// Results keep the account order; accounts without a client are omitted.
/// Cancelling the returned future aborts the per-account fetches.
pub async fn fan_out<T, F, Fut>(
    resolver: Arc<dyn ClientResolver>,
    boundaries: &FetchBoundaries,
    limit: usize,
    fetch: F,
) -> Vec<FetchResult<T>>
where
    T: Item,
    F: Fn(Arc<dyn RemoteClient>, Paging) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
{
    let account_ids = boundaries.account_ids();
    tracing::debug!(accounts = account_ids.len(), limit, "fan-out started");

    let handles: Vec<_> = account_ids
        .iter()
        .enumerate()
        .map(|(index, &account_id)| {
            let resolver = Arc::clone(&resolver);
            let fetch = fetch.clone();
            let max_id = boundaries.max_id(index);
            let since_id = boundaries.since_id(index);
            tokio::spawn(async move {
                fetch_account_page(resolver.as_ref(), account_id, max_id, since_id, limit, fetch)
                    .await
            })
        })
        .collect();
    let mut handles = AbortOnDrop(handles);

    let mut results = Vec::with_capacity(account_ids.len());
    for (index, handle) in handles.0.iter_mut().enumerate() {
        match handle.await {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => {
                let account_id = account_ids[index];
                tracing::error!(account_id, "fetch task failed: {e}");
                results.push(FetchResult::failed(
                    account_id,
                    boundaries.max_id(index),
                    boundaries.since_id(index),
                    limit,
                    ApiError::Transport(format!("fetch task failed: {e}")),
                ));
            }
        }
    }

    tracing::debug!(results = results.len(), "fan-out finished");
    results
}
