//! Look-ahead download cache for random-pool cycling.
//!
//! DESIGN
//! ======
//! The queue keeps the working pool plus three pieces of bookkeeping keyed by
//! identity: fetches in flight, fetches resolved, and a ready list in the order
//! entries became available. `prime` starts up to `prefetch_count` fetches as
//! detached tasks and returns immediately. `next` hands out ready entries,
//! rotating each to the back so consecutive picks differ when the pool allows.
//!
//! A completion is applied only while its fetch is still the tracked one for
//! that identity. `set_pool` keeps tracking fetches whose identity survives
//! into the new pool, so they are never issued twice; `reset` drops all
//! tracking, so a download that finishes afterwards is discarded.
//!
//! TRADE-OFFS
//! ==========
//! Preferring ready entries makes cycling less than perfectly random, but a
//! commit never stalls on I/O when anything is already downloaded. When nothing
//! is ready the caller falls back to a uniform pick and may wait.

#[cfg(test)]
#[path = "prefetch_test.rs"]
mod prefetch_test;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::seq::{IndexedRandom, SliceRandom};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::collab::{AuthContext, ContentService, materialize};
use crate::entry::PlacementEntry;
use crate::error::ContentError;

// =============================================================================
// FETCHER
// =============================================================================

/// How the queue decides what to download and how to download it.
#[async_trait::async_trait]
pub trait EntryFetcher: Send + Sync {
    /// Whether `entry` must be fetched before it can be placed.
    fn needs_fetch(&self, entry: &PlacementEntry) -> bool;

    /// Fetch `entry` and return its local path.
    async fn fetch(&self, entry: &PlacementEntry) -> Result<String, ContentError>;
}

/// `EntryFetcher` backed by the content service.
pub struct ContentFetcher {
    content: Arc<dyn ContentService>,
    auth: AuthContext,
}

impl ContentFetcher {
    #[must_use]
    pub fn new(content: Arc<dyn ContentService>, auth: AuthContext) -> Self {
        Self { content, auth }
    }
}

#[async_trait::async_trait]
impl EntryFetcher for ContentFetcher {
    fn needs_fetch(&self, entry: &PlacementEntry) -> bool {
        !entry.is_available() && self.content.local_path(entry).is_none()
    }

    async fn fetch(&self, entry: &PlacementEntry) -> Result<String, ContentError> {
        materialize(self.content.as_ref(), entry, &self.auth).await
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// Bounded look-ahead cache over a pool of entries.
#[derive(Clone)]
pub struct PrefetchQueue {
    inner: Arc<Mutex<QueueInner>>,
    fetcher: Arc<dyn EntryFetcher>,
    prefetch_count: usize,
}

#[derive(Default)]
struct QueueInner {
    pool: Vec<PlacementEntry>,
    /// Identity -> completion flag of a running fetch.
    in_flight: HashMap<String, watch::Receiver<bool>>,
    /// Identity -> local path of a finished fetch.
    resolved: HashMap<String, String>,
    /// Identities available for placement, oldest first.
    ready: VecDeque<String>,
}

impl QueueInner {
    fn entry(&self, identity: &str) -> Option<PlacementEntry> {
        self.pool.iter().find(|e| e.identity_key == identity).cloned()
    }
}

impl PrefetchQueue {
    #[must_use]
    pub fn new(fetcher: Arc<dyn EntryFetcher>, prefetch_count: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(QueueInner::default())), fetcher, prefetch_count: prefetch_count.max(1) }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the working pool. Fetches for identities that left the pool
    /// stop being tracked; the rest stay in flight. Entries that need no fetch
    /// are ready immediately, in pool order.
    pub fn set_pool(&self, entries: Vec<PlacementEntry>) {
        let mut inner = self.lock();
        inner.in_flight.retain(|identity, _| entries.iter().any(|e| e.identity_key == *identity));
        inner.ready.clear();
        let previously_resolved = std::mem::take(&mut inner.resolved);

        let mut pool = entries;
        for entry in &mut pool {
            if let Some(path) = previously_resolved.get(&entry.identity_key) {
                entry.cached_local_path.clone_from(path);
                inner.resolved.insert(entry.identity_key.clone(), path.clone());
            }
            if !self.fetcher.needs_fetch(entry) {
                inner.ready.push_back(entry.identity_key.clone());
            }
        }
        debug!(pool = pool.len(), ready = inner.ready.len(), in_flight = inner.in_flight.len(), "prefetch pool set");
        inner.pool = pool;
    }

    /// Stop tracking in-flight fetches and forget ready order. Late
    /// completions from before the reset are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.in_flight.clear();
        inner.resolved.clear();
        inner.ready.clear();
        inner.pool.clear();
    }

    /// Start fetches for up to `prefetch_count` entries that need one, in
    /// random order with `priority` first when given. Does not wait.
    pub fn prime(&self, priority: Option<&str>) {
        let batch = {
            let mut inner = self.lock();
            let capacity = self.prefetch_count.saturating_sub(inner.in_flight.len());
            if capacity == 0 {
                return;
            }
            let mut wanted: Vec<PlacementEntry> = inner
                .pool
                .iter()
                .filter(|e| !inner.in_flight.contains_key(&e.identity_key))
                .filter(|e| !inner.resolved.contains_key(&e.identity_key))
                .filter(|e| self.fetcher.needs_fetch(e))
                .cloned()
                .collect();
            wanted.shuffle(&mut rand::rng());
            if let Some(first) = priority {
                if let Some(idx) = wanted.iter().position(|e| e.identity_key == first) {
                    let entry = wanted.remove(idx);
                    wanted.insert(0, entry);
                }
            }
            wanted.truncate(capacity);

            let mut batch = Vec::with_capacity(wanted.len());
            for entry in wanted {
                let (tx, rx) = watch::channel(false);
                inner.in_flight.insert(entry.identity_key.clone(), rx);
                batch.push((entry, tx));
            }
            batch
        };

        for (entry, done) in batch {
            debug!(identity = %entry.identity_key, "prefetch issued");
            let queue = self.clone();
            tokio::spawn(async move {
                let outcome = queue.fetcher.fetch(&entry).await;
                queue.complete(&entry.identity_key, &done.subscribe(), outcome);
                done.send_replace(true);
            });
        }
    }

    fn complete(&self, identity: &str, fetch: &watch::Receiver<bool>, outcome: Result<String, ContentError>) {
        let mut inner = self.lock();
        let tracked = inner.in_flight.get(identity).is_some_and(|current| current.same_channel(fetch));
        if !tracked {
            debug!(identity, "stale prefetch discarded");
            return;
        }
        inner.in_flight.remove(identity);
        match outcome {
            Ok(path) => {
                debug!(identity, path = %path, "prefetch resolved");
                Self::apply_resolved(&mut inner, identity, path);
            }
            Err(e) => {
                warn!(identity, error = %e, "prefetch failed; entry will be fetched on demand");
            }
        }
    }

    fn apply_resolved(inner: &mut QueueInner, identity: &str, path: String) {
        if let Some(entry) = inner.pool.iter_mut().find(|e| e.identity_key == identity) {
            entry.cached_local_path.clone_from(&path);
        }
        inner.resolved.insert(identity.to_string(), path);
        if !inner.ready.iter().any(|id| id == identity) {
            inner.ready.push_back(identity.to_string());
        }
    }

    /// Record a download that completed outside the queue.
    pub fn mark_resolved(&self, identity: &str, path: &str) {
        let mut inner = self.lock();
        if inner.pool.iter().any(|e| e.identity_key == identity) {
            Self::apply_resolved(&mut inner, identity, path.to_string());
        }
    }

    /// The next ready entry that is not `previous`, or `None` when nothing
    /// else is ready. The returned entry moves to the back of the ready list.
    #[must_use]
    pub fn next(&self, previous: Option<&str>) -> Option<PlacementEntry> {
        let mut inner = self.lock();
        let idx = inner.ready.iter().position(|id| Some(id.as_str()) != previous)?;
        let identity = inner.ready.remove(idx)?;
        inner.ready.push_back(identity.clone());
        inner.entry(&identity)
    }

    /// Uniform pick over the whole pool.
    #[must_use]
    pub fn random_entry(&self) -> Option<PlacementEntry> {
        self.lock().pool.choose(&mut rand::rng()).cloned()
    }

    /// Current pool snapshot with resolved paths applied.
    #[must_use]
    pub fn pool(&self) -> Vec<PlacementEntry> {
        self.lock().pool.clone()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.lock().ready.len()
    }

    /// Local path for `identity` if a fetch already resolved it.
    #[must_use]
    pub fn resolved_path(&self, identity: &str) -> Option<String> {
        self.lock().resolved.get(identity).cloned()
    }

    /// Wait for an in-flight fetch of `identity`, then return its local path
    /// if it resolved. Returns immediately when nothing is in flight.
    pub async fn wait_for(&self, identity: &str) -> Option<String> {
        let pending = {
            let inner = self.lock();
            if let Some(path) = inner.resolved.get(identity) {
                return Some(path.clone());
            }
            inner.in_flight.get(identity).cloned()
        };
        if let Some(rx) = pending {
            self.await_fetch(identity, rx).await;
        }
        self.resolved_path(identity)
    }

    /// Wait until no fetch is in flight.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<(String, watch::Receiver<bool>)> =
                self.lock().in_flight.iter().map(|(id, rx)| (id.clone(), rx.clone())).collect();
            if pending.is_empty() {
                return;
            }
            for (identity, rx) in pending {
                self.await_fetch(&identity, rx).await;
            }
        }
    }

    /// Wait on one fetch. A task that died without reporting is untracked so
    /// the entry can be fetched again.
    async fn await_fetch(&self, identity: &str, mut rx: watch::Receiver<bool>) {
        if rx.wait_for(|done| *done).await.is_err() {
            warn!(identity, "prefetch task ended without reporting");
            let mut inner = self.lock();
            let dead = inner.in_flight.get(identity).is_some_and(|current| current.same_channel(&rx));
            if dead {
                inner.in_flight.remove(identity);
            }
        }
    }
}
