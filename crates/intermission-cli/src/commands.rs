//! CLI command implementations

use crate::output::{classification_text, to_json, OutputFormat};
use anyhow::Context;
use intermission_core::classifier::vocabulary::{derive_vocabulary, vocabulary_from_config};
use intermission_core::classifier::{normalize_rating, Classifier, Vocabulary};
use intermission_core::{HttpMetadataService, ItemDetails, ItemId, MetadataService};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Vocabulary files come in either shape
#[derive(Deserialize)]
#[serde(untagged)]
enum VocabularyFile {
    Buckets(BTreeMap<String, Vec<String>>),
    CatalogTags(Vec<String>),
}

fn load_vocabulary(path: &Path) -> anyhow::Result<Vocabulary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading vocabulary {}", path.display()))?;
    let file: VocabularyFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing vocabulary {}", path.display()))?;
    let vocabulary = match file {
        VocabularyFile::Buckets(buckets) => vocabulary_from_config(&buckets),
        VocabularyFile::CatalogTags(tags) => derive_vocabulary(&tags),
    };
    debug!(buckets = vocabulary.len(), "Vocabulary loaded");
    Ok(vocabulary)
}

fn print_classification(item: &ItemDetails, classifier: &Classifier, format: &str) {
    let result = classifier.classify(item);
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(&result)),
        OutputFormat::Text => {
            let title = if item.name.is_empty() { item.id.as_str() } else { item.name.as_str() };
            println!("{}", classification_text(title, &result));
            let line = result.descriptor_line();
            if !line.is_empty() {
                println!("\n  {line}");
            }
        }
    }
}

/// Classify an item JSON document
pub fn classify(
    item_path: &Path,
    vocabulary_path: Option<&Path>,
    priority: &[String],
    format: &str,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(item_path)
        .with_context(|| format!("reading item {}", item_path.display()))?;
    let item: ItemDetails = serde_json::from_str(&raw)
        .with_context(|| format!("parsing item {}", item_path.display()))?;

    let vocabulary = vocabulary_path.map(load_vocabulary).transpose()?;
    let classifier = Classifier::new(vocabulary.as_ref()).with_priority(priority);
    print_classification(&item, &classifier, format);
    Ok(())
}

#[derive(Serialize)]
struct RatingRow<'a> {
    raw: &'a str,
    band: String,
}

/// Normalize official ratings
pub fn rating(ratings: &[String], format: &str) -> anyhow::Result<()> {
    let rows: Vec<RatingRow<'_>> = ratings
        .iter()
        .map(|raw| RatingRow {
            raw,
            band: normalize_rating(raw),
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(&rows)),
        OutputFormat::Text => {
            for row in &rows {
                let band = if row.band.is_empty() { "(unrated)" } else { row.band.as_str() };
                println!("  {:<16} {}", row.raw, band);
            }
        }
    }
    Ok(())
}

/// Fetch an item and the catalog vocabulary from a live server, then classify
pub async fn inspect(
    server: &str,
    token: Option<String>,
    user: &str,
    item_id: &str,
    format: &str,
) -> anyhow::Result<()> {
    let service = HttpMetadataService::new(server, user, token)?;
    info!(server, item_id, "Fetching item");

    let item = service
        .item(&ItemId::new(item_id))
        .await
        .with_context(|| format!("fetching item {item_id}"))?;
    let vocabulary = match service.tag_vocabulary().await {
        Ok(tags) => Some(derive_vocabulary(&tags)),
        Err(err) => {
            debug!(error = %err, "Catalog tags unavailable; classifying with seed tokens only");
            None
        }
    };

    let classifier = Classifier::new(vocabulary.as_ref());
    print_classification(&item, &classifier, format);
    Ok(())
}
