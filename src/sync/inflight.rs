//! In-flight mutation tracking and the sending-drafts set

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::db::Collection;
use crate::events::{DomainEvent, EventBus};

/// Thread-safe set of `(account id, item id)` pairs with a pending mutation
#[derive(Clone, Default)]
pub struct InFlightIndex {
    entries: Arc<Mutex<HashSet<(i64, i64)>>>,
}

impl InFlightIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an item as pending until the returned guard is dropped
    pub fn register(&self, account_id: i64, item_id: i64) -> InFlightGuard {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((account_id, item_id));
        }
        InFlightGuard {
            index: self.clone(),
            key: (account_id, item_id),
        }
    }

    /// Whether a mutation on the item is pending
    pub fn contains(&self, account_id: i64, item_id: i64) -> bool {
        self.entries
            .lock()
            .is_ok_and(|entries| entries.contains(&(account_id, item_id)))
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: (i64, i64)) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&key);
        }
    }
}

/// Unregisters its entry on drop, whatever the mutation's outcome
#[must_use = "the entry is removed as soon as the guard is dropped"]
pub struct InFlightGuard {
    index: InFlightIndex,
    key: (i64, i64),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.index.remove(self.key);
    }
}

/// Ids of drafts currently being sent; changes notify the drafts collection
#[derive(Clone)]
pub struct DraftSet {
    ids: Arc<Mutex<HashSet<Uuid>>>,
    bus: EventBus,
}

impl DraftSet {
    /// Create an empty set publishing on `bus`
    pub fn new(bus: EventBus) -> Self {
        Self {
            ids: Arc::new(Mutex::new(HashSet::new())),
            bus,
        }
    }

    /// Mark a draft as being sent
    pub fn add(&self, id: Uuid) {
        let inserted = self.ids.lock().is_ok_and(|mut ids| ids.insert(id));
        if inserted {
            self.bus
                .publish(DomainEvent::CollectionChanged(Collection::Drafts));
        }
    }

    /// Unmark a draft
    pub fn remove(&self, id: Uuid) {
        let removed = self.ids.lock().is_ok_and(|mut ids| ids.remove(&id));
        if removed {
            self.bus
                .publish(DomainEvent::CollectionChanged(Collection::Drafts));
        }
    }

    /// Snapshot of the ids being sent
    pub fn ids(&self) -> Vec<Uuid> {
        self.ids
            .lock()
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_guard_unregisters_on_drop() {
        let index = InFlightIndex::new();
        let guard = index.register(1, 10);
        assert!(index.contains(1, 10));
        assert!(!index.contains(2, 10));

        drop(guard);
        assert!(!index.contains(1, 10));
        assert!(index.is_empty());
    }

    #[test]
    fn test_concurrent_register_and_lookup() {
        let index = InFlightIndex::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                std::thread::spawn(move || {
                    let _guard = index.register(i, i * 10);
                    assert!(index.contains(i, i * 10));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_draft_set_notifies_only_on_change() {
        let bus = EventBus::new();
        let mut store = bus.subscribe(EventKind::Store);
        let drafts = DraftSet::new(bus);
        let id = Uuid::new_v4();

        drafts.add(id);
        drafts.add(id);
        assert_eq!(drafts.ids(), vec![id]);
        drafts.remove(id);

        assert_eq!(
            store.recv().await.unwrap(),
            DomainEvent::CollectionChanged(Collection::Drafts)
        );
        assert_eq!(
            store.recv().await.unwrap(),
            DomainEvent::CollectionChanged(Collection::Drafts)
        );
        assert!(store.try_recv().is_err());
        assert!(drafts.ids().is_empty());
    }
}
