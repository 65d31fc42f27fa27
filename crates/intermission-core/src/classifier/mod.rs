//! Content descriptor classification
//!
//! Maps an item's metadata to at most two human-readable descriptors plus a
//! normalized age chip. Classification runs in tiers and stops at the first
//! tier that produces anything:
//!
//! 1. **Tags**: each tag is matched against the bucket vocabulary (catalog
//!    phrases) and the bucket seed tokens; one point per bucket per tag.
//! 2. **Genres**: the same matching, applied to the genre list.
//! 3. **Text**: weighted keyword matching over overview, taglines, tags and
//!    studios (see [`fallback`]).
//!
//! Negative tokens present anywhere in the matched terms subtract the
//! penalty (default [`buckets::NEGATIVE_PENALTY`]) from the bucket they
//! guard. Ties break by the configured priority order.

pub mod buckets;
pub mod fallback;
pub mod rating;
pub mod vocabulary;

pub use rating::{age_chip, normalize_rating};
pub use vocabulary::{Vocabulary, VocabularyStore};

use crate::{
    cache::TtlCache,
    config::{Labels, MonitorConfig},
    host::MetadataService,
    types::*,
};
use buckets::{priority_rank, BUCKETS, MAX_DESCRIPTORS, NEGATIVE_PENALTY, PRIORITY};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Lowercase alphanumeric tokens of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Canonical phrase form used for vocabulary matching
pub fn normalize_phrase(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Which tier produced the descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorSource {
    Tags,
    Genres,
    Text,
    None,
}

/// One displayed descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub key: String,
    pub label: String,
    pub score: f64,
}

/// Classification outcome for one item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub descriptors: Vec<Descriptor>,
    pub age_chip: String,
    pub source: DescriptorSource,
}

impl ClassificationResult {
    pub fn keys(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.key.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.label.as_str()).collect()
    }

    /// Labels joined for display, e.g. "Crime · Violence"
    pub fn descriptor_line(&self) -> String {
        self.labels().join(" · ")
    }
}

/// Phrase and token lookup into the bucket table
#[derive(Debug, Default)]
pub struct BucketIndex {
    tokens: HashMap<String, BTreeSet<usize>>,
    phrases: HashMap<String, BTreeSet<usize>>,
}

impl BucketIndex {
    pub fn new(vocabulary: Option<&Vocabulary>) -> Self {
        let mut index = Self::default();
        for (idx, bucket) in BUCKETS.iter().enumerate() {
            for seed in bucket.seeds {
                index.tokens.entry(seed.to_string()).or_default().insert(idx);
            }
        }
        if let Some(vocabulary) = vocabulary {
            for (key, phrases) in vocabulary {
                let Some(idx) = BUCKETS.iter().position(|bucket| bucket.key == key.as_str()) else {
                    continue;
                };
                for phrase in phrases {
                    index.phrases.entry(phrase.clone()).or_default().insert(idx);
                }
            }
        }
        index
    }

    /// Buckets hit by one term: its full phrase plus each of its tokens
    pub fn lookup(&self, phrase: &str, tokens: &[String]) -> BTreeSet<usize> {
        let mut hits = self.phrases.get(phrase).cloned().unwrap_or_default();
        for token in tokens {
            if let Some(buckets) = self.tokens.get(token) {
                hits.extend(buckets.iter().copied());
            }
        }
        hits
    }
}

/// Score every bucket for a list of tags or genres.
///
/// A term contributes at most one point to each bucket. Buckets that scored
/// lose the penalty once per distinct negative token found across all terms.
pub fn match_buckets(index: &BucketIndex, terms: &[String], penalty: f64) -> Vec<f64> {
    let mut scores = vec![0.0; BUCKETS.len()];
    let mut present: HashSet<String> = HashSet::new();
    for term in terms {
        let tokens = tokenize(term);
        if tokens.is_empty() {
            continue;
        }
        for idx in index.lookup(&tokens.join(" "), &tokens) {
            scores[idx] += 1.0;
        }
        present.extend(tokens);
    }
    for (idx, bucket) in BUCKETS.iter().enumerate() {
        if scores[idx] <= 0.0 {
            continue;
        }
        let negatives = bucket
            .negatives
            .iter()
            .filter(|negative| present.contains(**negative))
            .count();
        scores[idx] -= negatives as f64 * penalty;
    }
    scores
}

/// Tier-ordered descriptor classifier
#[derive(Debug)]
pub struct Classifier {
    index: BucketIndex,
    priority: Vec<String>,
    labels: Labels,
    penalty: f64,
    max_descriptors: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Classifier {
    pub fn new(vocabulary: Option<&Vocabulary>) -> Self {
        Self {
            index: BucketIndex::new(vocabulary),
            priority: buckets::default_priority(),
            labels: Labels::new(),
            penalty: NEGATIVE_PENALTY,
            max_descriptors: MAX_DESCRIPTORS,
        }
    }

    /// Override the tie-break order. Listed known keys come first; the rest
    /// keep their default order.
    pub fn with_priority(mut self, priority: &[String]) -> Self {
        self.priority = resolve_priority(priority);
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Score removed per negative token present
    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn classify(&self, item: &ItemDetails) -> ClassificationResult {
        let age_chip = normalize_rating(item.official_rating.as_deref().unwrap_or(""));

        let tag_scores = match_buckets(&self.index, &item.tags, self.penalty);
        let mut descriptors = self.rank(&tag_scores, 0.0);
        let mut source = DescriptorSource::Tags;

        if descriptors.is_empty() {
            let genre_scores = match_buckets(&self.index, &item.genres, self.penalty);
            descriptors = self.rank(&genre_scores, 0.0);
            source = DescriptorSource::Genres;
        }
        if descriptors.is_empty() {
            let text_scores = fallback::classify_text(item, self.penalty);
            descriptors = self.rank(&text_scores, fallback::MIN_TEXT_SCORE);
            source = DescriptorSource::Text;
        }
        if descriptors.is_empty() {
            source = DescriptorSource::None;
        }

        debug!(
            item_id = %item.id,
            source = ?source,
            descriptors = descriptors.len(),
            "Item classified"
        );
        ClassificationResult {
            descriptors,
            age_chip,
            source,
        }
    }

    fn rank(&self, scores: &[f64], threshold: f64) -> Vec<Descriptor> {
        let mut ranked: Vec<(usize, f64)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| *score > threshold)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1).then_with(|| {
                priority_rank(&self.priority, BUCKETS[a.0].key)
                    .cmp(&priority_rank(&self.priority, BUCKETS[b.0].key))
            })
        });
        ranked.truncate(self.max_descriptors);
        ranked
            .into_iter()
            .map(|(idx, score)| {
                let bucket = &BUCKETS[idx];
                Descriptor {
                    key: bucket.key.to_string(),
                    label: self.labels.get(&format!("descriptor.{}", bucket.key), bucket.label),
                    score,
                }
            })
            .collect()
    }
}

/// Known keys from `preferred` in order, then every remaining default key
pub fn resolve_priority(preferred: &[String]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::with_capacity(PRIORITY.len());
    for key in preferred {
        let key = key.trim().to_lowercase();
        if PRIORITY.contains(&key.as_str()) && !resolved.contains(&key) {
            resolved.push(key);
        }
    }
    for key in PRIORITY {
        if !resolved.iter().any(|existing| existing == key) {
            resolved.push(key.to_string());
        }
    }
    resolved
}

/// Vocabulary-aware classifier with per-item memoization
pub struct DescriptorEngine {
    vocabulary: VocabularyStore,
    priority: Vec<String>,
    penalty: f64,
    labels: Labels,
    current: Mutex<Option<(Arc<Vocabulary>, Arc<Classifier>)>>,
    results: TtlCache<ItemId, Arc<ClassificationResult>>,
}

impl DescriptorEngine {
    pub fn new(config: &MonitorConfig, labels: Labels) -> Self {
        Self {
            vocabulary: VocabularyStore::new(
                config.vocabulary_ttl(),
                config.descriptor_vocabulary.as_ref(),
            ),
            priority: resolve_priority(config.descriptor_priority.as_deref().unwrap_or(&[])),
            penalty: config.descriptor_negative_penalty,
            labels,
            current: Mutex::new(None),
            results: TtlCache::new(config.item_cache_ttl()),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Classify `item`, refreshing the vocabulary first when it is stale
    pub async fn classify(
        &self,
        metadata: &dyn MetadataService,
        item: &ItemDetails,
    ) -> Arc<ClassificationResult> {
        let stamp = metadata.scope_stamp();
        let id = item.item_id();
        if let Some(result) = self.results.get(&id, &stamp) {
            return result;
        }

        let vocabulary = self.vocabulary.ensure(metadata).await;
        let result = Arc::new(self.classifier_for(vocabulary).classify(item));
        if !id.as_str().is_empty() {
            self.results.insert(id, result.clone(), Some(stamp));
        }
        result
    }

    fn classifier_for(&self, vocabulary: Arc<Vocabulary>) -> Arc<Classifier> {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((built_for, classifier)) = current.as_ref() {
            if Arc::ptr_eq(built_for, &vocabulary) {
                return classifier.clone();
            }
        }
        let classifier = Arc::new(
            Classifier::new(Some(&vocabulary))
                .with_priority(&self.priority)
                .with_labels(self.labels.clone())
                .with_penalty(self.penalty),
        );
        *current = Some((vocabulary, classifier.clone()));
        classifier
    }

    pub fn clear(&self) {
        self.results.clear();
        self.vocabulary.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tags: &[&str], genres: &[&str]) -> ItemDetails {
        ItemDetails {
            id: "item-1".into(),
            name: "Sample".into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Sci-Fi / World War II"), vec!["sci", "fi", "world", "war", "ii"]);
        assert_eq!(normalize_phrase("  Organized   CRIME! "), "organized crime");
        assert!(tokenize("--").is_empty());
    }

    #[test]
    fn test_tags_crime_and_violence() {
        let result = Classifier::default().classify(&item(&["heist", "organized crime", "blood"], &[]));
        assert_eq!(result.keys(), vec!["crime", "violence"]);
        assert_eq!(result.source, DescriptorSource::Tags);
        assert_eq!(result.descriptors[0].score, 2.0);
    }

    #[test]
    fn test_negative_token_cancels_fairytale() {
        let result = Classifier::default().classify(&item(&["fairy tale", "battlefield"], &[]));
        assert!(!result.keys().contains(&"fairytale"));
        assert_eq!(result.keys(), vec!["war"]);
    }

    #[test]
    fn test_star_wars_is_not_war() {
        let result = Classifier::default().classify(&item(&["star wars", "space opera"], &[]));
        assert_eq!(result.keys(), vec!["scifi"]);
    }

    #[test]
    fn test_zero_penalty_keeps_negated_bucket() {
        let result = Classifier::default()
            .with_penalty(0.0)
            .classify(&item(&["star wars"], &[]));
        assert_eq!(result.keys(), vec!["war"]);
    }

    #[test]
    fn test_tie_breaks_by_priority() {
        let result = Classifier::default().classify(&item(&["romance", "comedy", "horror"], &[]));
        assert_eq!(result.keys(), vec!["horror", "romance"]);

        let custom = Classifier::default()
            .with_priority(&["comedy".to_string(), "bogus".to_string()])
            .classify(&item(&["romance", "comedy", "horror"], &[]));
        assert_eq!(custom.keys(), vec!["comedy", "horror"]);
    }

    #[test]
    fn test_vocabulary_phrase_match() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .entry("crime".to_string())
            .or_default()
            .insert("bank job".to_string());
        let result = Classifier::new(Some(&vocabulary)).classify(&item(&["Bank Job"], &[]));
        assert_eq!(result.keys(), vec!["crime"]);
    }

    #[test]
    fn test_genres_used_when_tags_empty() {
        let result = Classifier::default().classify(&item(&["based on novel"], &["Horror", "Drama"]));
        assert_eq!(result.keys(), vec!["horror"]);
        assert_eq!(result.source, DescriptorSource::Genres);
    }

    #[test]
    fn test_text_fallback() {
        let mut details = item(&[], &[]);
        details.overview = Some("A retired detective is pulled into one last heist.".into());
        let result = Classifier::default().classify(&details);
        assert_eq!(result.keys(), vec!["crime"]);
        assert_eq!(result.source, DescriptorSource::Text);
    }

    #[test]
    fn test_nothing_matches() {
        let result = Classifier::default().classify(&item(&[], &[]));
        assert!(result.descriptors.is_empty());
        assert_eq!(result.source, DescriptorSource::None);
        assert_eq!(result.age_chip, "");
    }

    #[test]
    fn test_labels_override() {
        let labels: Labels = [("descriptor.crime".to_string(), "Suç".to_string())]
            .into_iter()
            .collect();
        let mut details = item(&["heist"], &[]);
        details.official_rating = Some("TV-MA".into());
        let result = Classifier::default().with_labels(labels).classify(&details);
        assert_eq!(result.labels(), vec!["Suç"]);
        assert_eq!(result.age_chip, "17+");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::default();
        let details = item(&["zombie", "gore", "survival", "military"], &["Action"]);
        assert_eq!(classifier.classify(&details), classifier.classify(&details));
    }

    #[test]
    fn test_resolve_priority_keeps_every_key() {
        let resolved = resolve_priority(&["Family".to_string(), "family".to_string()]);
        assert_eq!(resolved[0], "family");
        assert_eq!(resolved.len(), PRIORITY.len());
    }
}
