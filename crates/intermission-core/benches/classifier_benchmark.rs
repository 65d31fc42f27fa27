//! Benchmarks for the descriptor classifier hot path
//!
//! Run with: cargo bench -p intermission-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use intermission_core::classifier::{
    fallback::classify_text, normalize_rating, vocabulary::derive_vocabulary, Classifier,
};
use intermission_core::types::*;

// ============================================================================
// Helpers
// ============================================================================

fn catalog_tags(count: usize) -> Vec<String> {
    const STEMS: &[&str] = &[
        "heist", "murder", "gore", "battlefield", "romance", "haunted", "spaceship",
        "drug addiction", "swearing", "car chase", "fairy tale", "nudity",
    ];
    (0..count)
        .map(|n| format!("{} {}", STEMS[n % STEMS.len()], n / STEMS.len()))
        .collect()
}

fn tagged_item() -> ItemDetails {
    ItemDetails {
        id: "bench-item".into(),
        name: "Bench".into(),
        official_rating: Some("TV-MA".into()),
        tags: vec![
            "heist".into(),
            "organized crime".into(),
            "blood".into(),
            "car chase".into(),
        ],
        genres: vec!["Crime".into(), "Action".into()],
        ..Default::default()
    }
}

fn text_only_item() -> ItemDetails {
    ItemDetails {
        id: "bench-text".into(),
        name: "Bench".into(),
        overview: Some(
            "After a brutal murder, a detective follows a trail of blood through the city's \
             underworld while a serial killer stalks the rain-soaked streets."
                .into(),
        ),
        taglines: vec!["Nobody gets out clean.".into()],
        ..Default::default()
    }
}

// ============================================================================
// Classifier Benchmarks
// ============================================================================

fn bench_classify_tiers(c: &mut Criterion) {
    let vocabulary = derive_vocabulary(&catalog_tags(500));
    let classifier = Classifier::new(Some(&vocabulary));
    let tagged = tagged_item();
    let text = text_only_item();

    let mut group = c.benchmark_group("Classify");
    group.bench_function("tags", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&tagged))))
    });
    group.bench_function("text_fallback", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&text))))
    });
    group.bench_function("classify_text", |b| {
        b.iter(|| black_box(classify_text(black_box(&text), 1.5)))
    });
    group.finish();
}

fn bench_vocabulary_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("Vocabulary Build");
    for size in [100usize, 1_000, 5_000] {
        let tags = catalog_tags(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tags, |b, tags| {
            b.iter(|| {
                let vocabulary = derive_vocabulary(black_box(tags));
                black_box(Classifier::new(Some(&vocabulary)))
            })
        });
    }
    group.finish();
}

fn bench_rating_normalization(c: &mut Criterion) {
    let ratings = ["PG-13", "TV-MA", "DE-16", "KR-19", "15", "NR", "FSK 12", "Approved"];
    c.bench_function("normalize_rating", |b| {
        b.iter(|| {
            for rating in ratings {
                black_box(normalize_rating(black_box(rating)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_classify_tiers,
    bench_vocabulary_build,
    bench_rating_normalization,
);
criterion_main!(benches);
