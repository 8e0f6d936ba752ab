//! Delayed, cancellable tasks keyed by string
//!
//! At most one live entry exists per key. An entry is removed when it is
//! cancelled and when its task exits on any path, including a panic in the
//! action. Removal on exit only touches the entry of the same generation, so
//! a task that outlives its cancellation never removes a newer entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Entries {
    next_generation: u64,
    live: HashMap<String, Entry>,
}

/// Registry of armed delayed tasks
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<Entries>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("armed", &self.len())
            .finish()
    }
}

/// Removes its entry when the owning task exits
struct EntryGuard {
    inner: Arc<Mutex<Entries>>,
    key: String,
    generation: u64,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        let mut entries = self.inner.lock();
        if entries
            .live
            .get(&self.key)
            .is_some_and(|e| e.generation == self.generation)
        {
            entries.live.remove(&self.key);
        }
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless cancelled first
    ///
    /// The action receives the entry's token so it can notice a cancellation
    /// that arrives while it runs. Returns `false` without arming anything if
    /// `key` already has a live entry.
    pub fn arm<F, Fut>(&self, key: &str, delay: Duration, action: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = {
            let mut entries = self.inner.lock();
            if entries.live.contains_key(key) {
                return false;
            }
            let generation = entries.next_generation;
            entries.next_generation += 1;
            entries.live.insert(
                key.to_string(),
                Entry {
                    generation,
                    token: token.clone(),
                },
            );
            EntryGuard {
                inner: self.inner.clone(),
                key: key.to_string(),
                generation,
            }
        };

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(key = %guard.key, "scheduled task cancelled before firing");
                }
                () = tokio::time::sleep(delay) => {
                    action(token.clone()).await;
                }
            }
            drop(guard);
        });

        true
    }

    /// Cancel and remove the entry for `key`; returns whether one existed
    pub fn cancel(&self, key: &str) -> bool {
        let entry = self.inner.lock().live.remove(key);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every entry
    pub fn cancel_all(&self) {
        let drained: Vec<Entry> = self.inner.lock().live.drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.token.cancel();
        }
    }

    #[must_use]
    pub fn is_armed(&self, key: &str) -> bool {
        self.inner.lock().live.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
