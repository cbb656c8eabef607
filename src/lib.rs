pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use models::*;

use anyhow::Result;
use services::business_rules::BusinessDataSource;
use services::cache::{RecommendationStore, RedisRecommendationStore};
use services::feature_store::{FeatureStore, InMemoryFeatureStore, PgFeatureStore};
use services::recommendation::RecommendationService;
use services::snapshot::SnapshotStore;
use services::training::TrainingService;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub snapshots: Arc<SnapshotStore>,
    pub training_service: Arc<TrainingService>,
    pub recommendation_service: Arc<RecommendationService>,
}

impl AppState {
    /// Production wiring: Postgres for features and business data, Redis for
    /// generated recommendations.
    pub async fn new(config: Config) -> Result<Self> {
        let pg = Arc::new(
            utils::retry_with_backoff(
                || PgFeatureStore::connect(&config.postgres.url, config.postgres.max_connections),
                3,
                Duration::from_millis(500),
            )
            .await?,
        );

        let redis_client = Arc::new(redis::Client::open(config.redis.url.as_str())?);
        let store = Arc::new(RedisRecommendationStore::new(redis_client, config.redis.ttl_seconds));

        info!("Connected to Postgres and Redis");
        Ok(Self::with_components(config, pg.clone(), pg, store))
    }

    pub fn with_components(
        config: Config,
        feature_store: Arc<dyn FeatureStore>,
        business_data: Arc<dyn BusinessDataSource>,
        store: Arc<dyn RecommendationStore>,
    ) -> Self {
        let config = Arc::new(config);
        let snapshots = Arc::new(SnapshotStore::new());

        let training_service = Arc::new(TrainingService::new(
            feature_store.clone(),
            snapshots.clone(),
            config.clone(),
        ));

        let recommendation_service = Arc::new(RecommendationService::new(
            &config,
            feature_store,
            business_data,
            training_service.clone(),
            store,
        ));

        Self {
            config,
            snapshots,
            training_service,
            recommendation_service,
        }
    }

    /// Fully in-process wiring over one in-memory feature store.
    pub fn in_memory(config: Config, features: Arc<InMemoryFeatureStore>) -> Self {
        let store = Arc::new(services::cache::InMemoryRecommendationStore::new());
        Self::with_components(config, features.clone(), features, store)
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
