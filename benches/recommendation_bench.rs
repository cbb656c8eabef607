use criterion::{black_box, criterion_group, criterion_main, Criterion};
use menurec::algorithms::initializer::seeded_rng;
use menurec::algorithms::{build_documents, ContentModel, InteractionMatrix, LatentFactors};
use menurec::config::VoteAggregation;
use menurec::services::business_rules::BusinessContext;
use menurec::services::feature_store::FeatureData;
use menurec::services::recommendation::HybridRanker;
use menurec::services::snapshot::ModelSnapshot;
use menurec::*;
use rand::Rng;

const USERS: i64 = 300;
const ITEMS: i64 = 200;
const CATEGORIES: [&str; 8] = ["Curry", "Noodles", "Soup", "Salad", "Grill", "Dessert", "Rice", "Drinks"];
const INGREDIENTS: [&str; 12] = [
    "chicken", "beef", "tofu", "rice", "noodle", "coconut", "chili", "garlic", "basil", "lime", "egg", "mango",
];

fn synthetic_data() -> FeatureData {
    let mut rng = seeded_rng(7);

    let ratings = (0..USERS * 8)
        .map(|i| RatingRow {
            user_id: i % USERS,
            item_id: rng.gen_range(0..ITEMS),
            rating: rng.gen_range(1..=5) as f64,
        })
        .collect();

    let orders = (0..USERS * 4)
        .map(|i| OrderRow {
            user_id: i % USERS,
            item_id: rng.gen_range(0..ITEMS),
            purchase_count: rng.gen_range(1..4),
        })
        .collect();

    let mut item_features = Vec::new();
    for item_id in 0..ITEMS {
        let category = (item_id as usize) % CATEGORIES.len();
        for k in 0..3 {
            item_features.push(ItemFeatureRow {
                item_id,
                name: format!("Dish {}", item_id),
                category_id: Some(category as i64 + 1),
                category: Some(CATEGORIES[category].to_string()),
                ingredient: Some(INGREDIENTS[(item_id as usize * 3 + k) % INGREDIENTS.len()].to_string()),
                feature: None,
                order_count: Some(rng.gen_range(0..50)),
                average_rating: Some(rng.gen_range(1.0..5.0)),
            });
        }
    }

    FeatureData {
        ratings,
        orders,
        item_features,
        preferences: Vec::new(),
    }
}

fn benchmark_models(c: &mut Criterion) {
    let data = synthetic_data();
    let config = Config::default();
    let matrix = InteractionMatrix::build(&data.ratings, &data.orders, VoteAggregation::Mean);
    let documents = build_documents(&data.item_features);

    c.bench_function("interaction_matrix_build", |b| {
        b.iter(|| black_box(InteractionMatrix::build(&data.ratings, &data.orders, VoteAggregation::Mean)))
    });

    c.bench_function("truncated_svd_k50", |b| {
        b.iter(|| black_box(LatentFactors::train(&matrix, 50, 42).unwrap()))
    });

    c.bench_function("tfidf_cosine_similarity", |b| {
        b.iter(|| black_box(ContentModel::train(&documents, &config.content).unwrap()))
    });
}

fn benchmark_ranking(c: &mut Criterion) {
    let config = Config::default();
    let snapshot = ModelSnapshot::build(synthetic_data(), &config, &ModelSnapshot::untrained()).unwrap();
    let ranker = HybridRanker::new(&config);
    let ctx = BusinessContext::default();
    let mut rng = seeded_rng(1);

    c.bench_function("hybrid_rank_known_user", |b| {
        b.iter(|| black_box(ranker.rank(&snapshot, 17, &ctx, &mut rng)))
    });

    c.bench_function("popularity_rank_unknown_user", |b| {
        b.iter(|| black_box(ranker.rank(&snapshot, 999_999, &ctx, &mut rng)))
    });
}

criterion_group!(benches, benchmark_models, benchmark_ranking);
criterion_main!(benches);
