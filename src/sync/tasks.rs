//! Bounded background task pool with tags, cancellation and single-flight slots

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, Semaphore};
use tokio::task::AbortHandle;

use crate::db::Collection;

/// Identifier of a spawned background task
pub type TaskId = u64;

/// Remote resource with its own fetch/store pipeline and single-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Home timeline statuses
    HomeTimeline,
    /// Mention statuses
    Mentions,
    /// Received direct messages
    ReceivedMessages,
    /// Sent direct messages
    SentMessages,
    /// Trends for the configured region
    LocalTrends,
}

impl ResourceClass {
    /// Local collection the class is merged into
    pub const fn collection(self) -> Collection {
        match self {
            Self::HomeTimeline => Collection::HomeStatuses,
            Self::Mentions => Collection::Mentions,
            Self::ReceivedMessages => Collection::Inbox,
            Self::SentMessages => Collection::Outbox,
            Self::LocalTrends => Collection::LocalTrends,
        }
    }

    /// Name for logs and messages
    pub const fn label(self) -> &'static str {
        match self {
            Self::HomeTimeline => "home timeline",
            Self::Mentions => "mentions",
            Self::ReceivedMessages => "received messages",
            Self::SentMessages => "sent messages",
            Self::LocalTrends => "trends",
        }
    }
}

/// What a running task is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskTag {
    /// Fan-out fetch of a resource class
    Fetch(ResourceClass),
    /// Merge of fetched results into the local store
    Store(ResourceClass),
    /// Remote mutation
    Mutation,
    /// Best-effort user/status cache write
    CacheUsers,
}

struct Running {
    tag: TaskTag,
    abort: AbortHandle,
}

struct Inner {
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    running: Mutex<HashMap<TaskId, Running>>,
    idle: Notify,
}

impl Inner {
    fn remove(&self, id: TaskId) -> Option<Running> {
        let mut running = self.running.lock().ok()?;
        let removed = running.remove(&id);
        if running.is_empty() {
            self.idle.notify_waiters();
        }
        removed
    }
}

/// Removes the task from the running set when its future is dropped,
/// whether it completed, panicked or was aborted
struct Finished {
    inner: Arc<Inner>,
    id: TaskId,
}

impl Drop for Finished {
    fn drop(&mut self) {
        self.inner.remove(self.id);
    }
}

/// Bounded pool of tagged background tasks.
///
/// At most `max_concurrent` tasks run their bodies at once; the rest wait for
/// a permit. Tasks count as running from spawn until they finish.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Create a pool running at most `max_concurrent` tasks at once
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                next_id: AtomicU64::new(1),
                running: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        }
    }

    /// Spawn a task
    pub fn spawn<F>(&self, tag: TaskTag, future: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_with(tag, |_| future)
    }

    /// Spawn a task built from its own id
    pub fn spawn_with<F, Fut>(&self, tag: TaskTag, make: F) -> TaskId
    where
        F: FnOnce(TaskId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let future = make(id);
        let permits = Arc::clone(&self.inner.permits);
        let finished = Finished {
            inner: Arc::clone(&self.inner),
            id,
        };

        // Registration happens under the lock so a fast task cannot
        // unregister before it is registered.
        let Ok(mut running) = self.inner.running.lock() else {
            tracing::error!(?tag, "task registry poisoned, task not started");
            return id;
        };
        let handle = tokio::spawn(async move {
            let _finished = finished;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            future.await;
        });
        running.insert(
            id,
            Running {
                tag,
                abort: handle.abort_handle(),
            },
        );
        drop(running);

        tracing::trace!(task_id = id, ?tag, "task spawned");
        id
    }

    /// Abort a task; no-op when it already finished
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.inner.remove(id) {
            Some(task) => {
                task.abort.abort();
                tracing::debug!(task_id = id, tag = ?task.tag, "task cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a task is still running
    pub fn has_running_task(&self, id: TaskId) -> bool {
        self.inner
            .running
            .lock()
            .is_ok_and(|running| running.contains_key(&id))
    }

    /// Whether any task with this tag is running
    pub fn has_running_tasks_for_tag(&self, tag: TaskTag) -> bool {
        self.inner
            .running
            .lock()
            .is_ok_and(|running| running.values().any(|task| task.tag == tag))
    }

    /// Number of running tasks
    pub fn running_count(&self) -> usize {
        self.inner
            .running
            .lock()
            .map_or(0, |running| running.len())
    }

    /// Wait until no task is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.running_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks the current fetch task of each resource class.
///
/// Starting a new fetch cancels the tracked one; a completion whose id no
/// longer matches the slot is stale and must be ignored.
#[derive(Clone, Default)]
pub struct SingleFlight {
    slots: Arc<Mutex<HashMap<ResourceClass, TaskId>>>,
}

impl SingleFlight {
    /// Cancel the tracked task of `class`, start a new one and track it
    pub fn replace<F>(&self, class: ResourceClass, tasks: &TaskManager, start: F) -> TaskId
    where
        F: FnOnce() -> TaskId,
    {
        let Ok(mut slots) = self.slots.lock() else {
            return start();
        };
        if let Some(previous) = slots.remove(&class) {
            if tasks.cancel(previous) {
                tracing::debug!(class = class.label(), task_id = previous, "superseded fetch");
            }
        }
        let id = start();
        slots.insert(class, id);
        id
    }

    /// Clear the slot if it still tracks `id`; `false` means the caller is stale
    pub fn finish(&self, class: ResourceClass, id: TaskId) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        if slots.get(&class) == Some(&id) {
            slots.remove(&class);
            true
        } else {
            false
        }
    }

    /// Task currently tracked for `class`
    pub fn current(&self, class: ResourceClass) -> Option<TaskId> {
        self.slots.lock().ok()?.get(&class).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_task_is_tracked_until_finished() {
        let tasks = TaskManager::new(2);
        let (tx, rx) = oneshot::channel::<()>();
        let id = tasks.spawn(TaskTag::Mutation, async move {
            let _ = rx.await;
        });

        assert!(tasks.has_running_task(id));
        assert!(tasks.has_running_tasks_for_tag(TaskTag::Mutation));
        assert!(!tasks.has_running_tasks_for_tag(TaskTag::CacheUsers));

        tx.send(()).unwrap();
        tasks.wait_idle().await;
        assert!(!tasks.has_running_task(id));
    }

    #[tokio::test]
    async fn test_cancel_aborts_task() {
        let tasks = TaskManager::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let id = tasks.spawn(TaskTag::Fetch(ResourceClass::HomeTimeline), async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tasks.cancel(id));
        assert!(!tasks.cancel(id));
        tasks.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let tasks = TaskManager::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.spawn(TaskTag::Mutation, async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        tasks.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_single_flight_replaces_and_detects_stale() {
        let tasks = TaskManager::new(4);
        let slots = SingleFlight::default();
        let class = ResourceClass::Mentions;

        let first = slots.replace(class, &tasks, || {
            tasks.spawn(TaskTag::Fetch(class), std::future::pending())
        });
        let second = slots.replace(class, &tasks, || {
            tasks.spawn(TaskTag::Fetch(class), std::future::pending())
        });

        assert_ne!(first, second);
        assert!(!tasks.has_running_task(first));
        assert_eq!(slots.current(class), Some(second));

        assert!(!slots.finish(class, first));
        assert!(slots.finish(class, second));
        assert_eq!(slots.current(class), None);
        tasks.cancel(second);
    }
}
