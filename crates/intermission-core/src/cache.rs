//! TTL cache layer
//!
//! Memoized metadata lookups. Entries carry the scope stamp (server + user)
//! they were written under; a read is a hit only while the entry is younger
//! than the TTL *and* the stamp still matches the acting identity. Every
//! mutation is a single synchronous step, never spanning an `.await`.

use crate::{
    host::MetadataService,
    types::*,
    Error,
};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Cached value with its write time and optional scope stamp
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub stamp: Option<ScopeStamp>,
}

impl<T> CacheEntry<T> {
    /// Valid while younger than `ttl` and written under the same scope (unscoped entries always match)
    pub fn is_valid(&self, now: Instant, ttl: Duration, stamp: &ScopeStamp) -> bool {
        let fresh = now.saturating_duration_since(self.stored_at) < ttl;
        let same_scope = self.stamp.as_ref().map_or(true, |stored| stored == stamp);
        fresh && same_scope
    }
}

/// Keyed TTL cache
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, 256)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read a value; stale or foreign-scope entries are dropped and read as a miss
    pub fn get(&self, key: &K, stamp: &ScopeStamp) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key).map(|entry| entry.is_valid(now, self.ttl, stamp)) {
            Some(true) => entries.get(key).map(|entry| entry.value.clone()),
            Some(false) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, stamp: Option<ScopeStamp>) {
        let mut entries = self.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                stamp,
            },
        );
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every scoped entry written under a different stamp
    pub fn invalidate_scope(&self, current: &ScopeStamp) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stamp.as_ref().map_or(true, |stamp| stamp == current));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cached, failure-tolerant front of the metadata service
pub struct MetadataCache {
    service: Arc<dyn MetadataService>,
    items: TtlCache<ItemId, Arc<ItemDetails>>,
    similar: TtlCache<ItemId, Arc<Vec<ItemSummary>>>,
}

impl MetadataCache {
    pub fn new(service: Arc<dyn MetadataService>, ttl: Duration) -> Self {
        Self {
            service,
            items: TtlCache::new(ttl),
            similar: TtlCache::new(ttl),
        }
    }

    pub fn service(&self) -> &Arc<dyn MetadataService> {
        &self.service
    }

    pub fn scope_stamp(&self) -> ScopeStamp {
        self.service.scope_stamp()
    }

    /// Item details, or the error for callers that need to tell "missing" apart
    #[instrument(skip(self, id), fields(item_id = %id))]
    pub async fn try_item_details(&self, id: &ItemId) -> crate::Result<Arc<ItemDetails>> {
        let stamp = self.service.scope_stamp();
        if let Some(details) = self.items.get(id, &stamp) {
            debug!("Item details cache hit");
            return Ok(details);
        }

        match self.service.item(id).await {
            Ok(details) => {
                let details = Arc::new(details);
                self.items.insert(id.clone(), details.clone(), Some(stamp));
                Ok(details)
            }
            Err(err) => {
                self.note_failure(&err);
                Err(err)
            }
        }
    }

    /// Item details; any failure reads as "no data"
    pub async fn item_details(&self, id: &ItemId) -> Option<Arc<ItemDetails>> {
        self.try_item_details(id).await.ok()
    }

    /// Recommendation rail entries; failures read as an empty rail
    pub async fn similar_items(&self, id: &ItemId, limit: usize) -> Arc<Vec<ItemSummary>> {
        let stamp = self.service.scope_stamp();
        if let Some(items) = self.similar.get(id, &stamp) {
            return items;
        }
        match self.service.similar_items(id, limit).await {
            Ok(mut items) => {
                items.truncate(limit);
                let items = Arc::new(items);
                self.similar.insert(id.clone(), items.clone(), Some(stamp));
                items
            }
            Err(err) => {
                self.note_failure(&err);
                Arc::new(Vec::new())
            }
        }
    }

    /// Sessions are never cached
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        match self.service.sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                self.note_failure(&err);
                Vec::new()
            }
        }
    }

    /// Drop entries written for another server or user
    pub fn invalidate_scope(&self) {
        let stamp = self.service.scope_stamp();
        let dropped = self.items.invalidate_scope(&stamp) + self.similar.invalidate_scope(&stamp);
        if dropped > 0 {
            debug!(dropped, scope = %stamp, "Invalidated cache entries for previous scope");
        }
    }

    pub fn clear(&self) {
        self.items.clear();
        self.similar.clear();
    }

    fn note_failure(&self, err: &Error) {
        if matches!(err, Error::Unauthorized) {
            warn!("Metadata service rejected credentials; clearing them");
            self.service.clear_credentials();
        } else {
            debug!(code = err.error_code(), error = %err, "Metadata lookup failed");
        }
    }
}
