//! Catalog-derived descriptor vocabulary
//!
//! Lazily fetches the catalog's tag vocabulary and keeps every tag whose
//! tokens hit a bucket seed. The derived map is cached per scope stamp; a
//! vocabulary supplied in configuration always wins and skips the fetch.

use super::{buckets::BUCKETS, normalize_phrase, tokenize};
use crate::{cache::TtlCache, host::MetadataService, Error};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bucket key -> normalized tag phrases
pub type Vocabulary = BTreeMap<String, BTreeSet<String>>;

/// Catalog fetch attempts per refresh
const MAX_FETCH_ATTEMPTS: usize = 2;

/// Intersect the catalog vocabulary with the per-bucket seed tokens
pub fn derive_vocabulary(catalog_tags: &[String]) -> Vocabulary {
    let mut vocabulary = Vocabulary::new();
    for tag in catalog_tags {
        let tokens = tokenize(tag);
        if tokens.is_empty() {
            continue;
        }
        let phrase = tokens.join(" ");
        for bucket in BUCKETS {
            if tokens.iter().any(|token| bucket.seeds.contains(&token.as_str())) {
                vocabulary
                    .entry(bucket.key.to_string())
                    .or_default()
                    .insert(phrase.clone());
            }
        }
    }
    vocabulary
}

/// Normalize a configured bucket -> tags map
pub fn vocabulary_from_config(configured: &BTreeMap<String, Vec<String>>) -> Vocabulary {
    configured
        .iter()
        .map(|(bucket, tags)| {
            let phrases = tags
                .iter()
                .map(|tag| normalize_phrase(tag))
                .filter(|phrase| !phrase.is_empty())
                .collect();
            (bucket.trim().to_lowercase(), phrases)
        })
        .collect()
}

/// Scope-stamped holder of the current vocabulary
pub struct VocabularyStore {
    configured: Option<Arc<Vocabulary>>,
    derived: TtlCache<(), Arc<Vocabulary>>,
}

impl VocabularyStore {
    pub fn new(ttl: Duration, configured: Option<&BTreeMap<String, Vec<String>>>) -> Self {
        Self {
            configured: configured.map(|map| Arc::new(vocabulary_from_config(map))),
            derived: TtlCache::with_capacity(ttl, 1),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured.is_some()
    }

    /// Return the vocabulary, fetching and deriving it when missing or stale.
    /// Fetch failures yield an empty vocabulary that is not cached.
    pub async fn ensure(&self, metadata: &dyn MetadataService) -> Arc<Vocabulary> {
        if let Some(configured) = &self.configured {
            return configured.clone();
        }
        let stamp = metadata.scope_stamp();
        if let Some(vocabulary) = self.derived.get(&(), &stamp) {
            return vocabulary;
        }

        let mut last_error: Option<Error> = None;
        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            match metadata.tag_vocabulary().await {
                Ok(tags) => {
                    let vocabulary = Arc::new(derive_vocabulary(&tags));
                    info!(
                        catalog_tags = tags.len(),
                        buckets = vocabulary.len(),
                        scope = %stamp,
                        "Descriptor vocabulary derived"
                    );
                    self.derived.insert((), vocabulary.clone(), Some(stamp));
                    return vocabulary;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "Tag vocabulary fetch failed");
                    if matches!(err, Error::Unauthorized) {
                        metadata.clear_credentials();
                        last_error = Some(err);
                        break;
                    }
                    last_error = Some(err);
                }
            }
        }
        if let Some(err) = last_error {
            warn!(code = err.error_code(), "Descriptor vocabulary unavailable; using seeds only");
        }
        Arc::new(Vocabulary::new())
    }

    pub fn invalidate(&self) {
        self.derived.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CatalogService {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetadataService for CatalogService {
        fn scope_stamp(&self) -> ScopeStamp {
            ScopeStamp::new("srv", "user")
        }

        async fn item(&self, id: &ItemId) -> crate::Result<ItemDetails> {
            Err(Error::NotFound(id.to_string()))
        }

        async fn sessions(&self) -> crate::Result<Vec<SessionInfo>> {
            Ok(Vec::new())
        }

        async fn tag_vocabulary(&self) -> crate::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Http { status: 503, url: "/Items/Filters".into() });
            }
            Ok(vec![
                "Organized Crime".into(),
                "bank-robbery".into(),
                "World War II".into(),
                "based on novel".into(),
            ])
        }
    }

    #[test]
    fn test_derive_vocabulary_intersects_seeds() {
        let tags = vec!["Organized Crime".to_string(), "based on novel".to_string()];
        let vocabulary = derive_vocabulary(&tags);
        assert!(vocabulary["crime"].contains("organized crime"));
        assert!(vocabulary.values().all(|phrases| !phrases.contains("based on novel")));
    }

    #[test]
    fn test_configured_vocabulary_normalized() {
        let mut configured = BTreeMap::new();
        configured.insert("Crime".to_string(), vec!["Bank Job!".to_string(), "  ".to_string()]);
        let vocabulary = vocabulary_from_config(&configured);
        assert_eq!(vocabulary["crime"].len(), 1);
        assert!(vocabulary["crime"].contains("bank job"));
    }

    #[test]
    fn test_ensure_fetches_once_per_scope() {
        let service = CatalogService { calls: AtomicUsize::new(0), fail: false };
        let store = VocabularyStore::new(Duration::from_secs(3600), None);

        let first = tokio_test::block_on(store.ensure(&service));
        let second = tokio_test::block_on(store.ensure(&service));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first["war"].contains("world war ii"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_configured_vocabulary_skips_fetch() {
        let service = CatalogService { calls: AtomicUsize::new(0), fail: false };
        let mut configured = BTreeMap::new();
        configured.insert("crime".to_string(), vec!["bank job".to_string()]);
        let store = VocabularyStore::new(Duration::from_secs(3600), Some(&configured));

        let vocabulary = tokio_test::block_on(store.ensure(&service));
        assert!(vocabulary["crime"].contains("bank job"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_fetch_is_bounded_and_not_cached() {
        let service = CatalogService { calls: AtomicUsize::new(0), fail: true };
        let store = VocabularyStore::new(Duration::from_secs(3600), None);

        assert!(tokio_test::block_on(store.ensure(&service)).is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), MAX_FETCH_ATTEMPTS);
        tokio_test::block_on(store.ensure(&service));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2 * MAX_FETCH_ATTEMPTS);
    }
}
