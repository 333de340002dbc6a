//! Cancellable, debounced one-shot timers keyed by identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Pending delayed actions, at most one per key.
///
/// Scheduling a key that already has a pending action aborts the old one, so
/// repeated triggers coalesce into a single action timed from the latest call.
#[derive(Debug)]
pub struct DebouncedTimers<K>
where
    K: Eq + Hash,
{
    pending: Arc<DashMap<K, (u64, AbortHandle)>>,
    generation: AtomicU64,
}

impl<K> DebouncedTimers<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// (Re)schedules `action` to run after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        // The entry guard is held until the handle is stored, so a zero-delay
        // task cannot clear its slot before it exists.
        let entry = self.pending.entry(key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = pending
                .remove_if(&task_key, |_, (current, _)| *current == generation)
                .is_some();
            if fired {
                action.await;
            }
        })
        .abort_handle();

        match entry {
            Entry::Occupied(mut occupied) => {
                let (_, previous) = occupied.insert((generation, handle));
                previous.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert((generation, handle));
            }
        }
    }

    /// Cancels the pending action for `key`. Returns true if one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl<K> Default for DebouncedTimers<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(count: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let count = Arc::clone(count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timers = DebouncedTimers::new();
        let fired = counter();
        timers.schedule("h1", Duration::from_secs(30), bump(&fired));
        assert!(timers.is_pending(&"h1"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&"h1"));
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_coalesces_and_restarts_the_clock() {
        let timers = DebouncedTimers::new();
        let fired = counter();
        timers.schedule("h1", Duration::from_secs(30), bump(&fired));

        tokio::time::sleep(Duration::from_secs(20)).await;
        timers.schedule("h1", Duration::from_secs(30), bump(&fired));
        assert_eq!(timers.pending_count(), 1);

        // 35s after the first trigger, 15s after the second.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let timers = DebouncedTimers::new();
        let fired = counter();
        timers.schedule("h1", Duration::from_secs(30), bump(&fired));
        timers.schedule("h2", Duration::from_secs(30), bump(&fired));

        assert!(timers.cancel(&"h1"));
        assert!(!timers.cancel(&"h1"));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending_count(), 0);
    }
}
