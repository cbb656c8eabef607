mod fallback;
mod ranker;

pub use fallback::preference_weights;
pub use ranker::{dynamic_weights, HybridRanker, RankPath};

use crate::config::Config;
use crate::error::EngineResult;
use crate::models::*;
use crate::services::business_rules::{BusinessContext, BusinessDataSource};
use crate::services::cache::RecommendationStore;
use crate::services::feature_store::FeatureStore;
use crate::services::snapshot::SnapshotStore;
use crate::services::training::{RefreshOutcome, TrainingService};
use crate::utils::validation::validate_preferences;
use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RecommendationService {
    snapshots: Arc<SnapshotStore>,
    feature_store: Arc<dyn FeatureStore>,
    business_data: Arc<dyn BusinessDataSource>,
    training: Arc<TrainingService>,
    store: Arc<dyn RecommendationStore>,
    ranker: HybridRanker,
    top_n: usize,
    serving_stats: DashMap<String, u64>,
}

impl RecommendationService {
    pub fn new(
        config: &Config,
        feature_store: Arc<dyn FeatureStore>,
        business_data: Arc<dyn BusinessDataSource>,
        training: Arc<TrainingService>,
        store: Arc<dyn RecommendationStore>,
    ) -> Self {
        Self {
            snapshots: training.snapshots().clone(),
            feature_store,
            business_data,
            training,
            store,
            ranker: HybridRanker::new(config),
            top_n: config.recommendation.top_n,
            serving_stats: DashMap::new(),
        }
    }

    pub async fn rank(&self, user_id: UserId) -> RankOutcome {
        let mut rng = StdRng::from_entropy();
        self.rank_with_rng(user_id, &mut rng).await
    }

    /// Same as [`rank`](Self::rank) with a caller-provided noise source.
    pub async fn rank_with_rng<R: Rng + Send + ?Sized>(&self, user_id: UserId, rng: &mut R) -> RankOutcome {
        let snapshot = self.snapshots.current();
        if !snapshot.is_trained() {
            self.record("unavailable");
            return RankOutcome::Unavailable("models have not been trained yet".to_string());
        }

        let dietary = snapshot.preferences.dietary_restrictions(user_id);
        let ctx = BusinessContext::load(self.business_data.as_ref(), dietary, Utc::now()).await;

        let (path, outcome) = self.ranker.rank(&snapshot, user_id, &ctx, rng);
        match &outcome {
            RankOutcome::Ranked(items) => {
                info!("Ranked {} items for user {} via {}", items.len(), user_id, path.as_str());
                self.record(path.as_str());
            }
            _ => {
                warn!("No recommendations survived filtering for user {} via {}", user_id, path.as_str());
                self.record("empty");
            }
        }
        outcome
    }

    /// Ranks and persists the result. Nothing is stored unless the ranking
    /// produced items.
    pub async fn generate_and_store(&self, user_id: UserId) -> EngineResult<RankOutcome> {
        let outcome = self.rank(user_id).await;
        if let RankOutcome::Ranked(items) = &outcome {
            let response = RecommendationResponse::new(user_id, items.clone());
            self.store.save(&response).await?;
        }
        Ok(outcome)
    }

    /// Stored recommendations if any, otherwise a fresh ranking. Stored items
    /// are re-gated against current stock before they are returned.
    pub async fn get_or_generate(&self, user_id: UserId) -> EngineResult<RecommendationResponse> {
        match self.store.load(user_id).await {
            Ok(Some(cached)) if !cached.recommendations.is_empty() => {
                if let Some(response) = self.gate_stored(cached).await {
                    self.record("stored");
                    return Ok(response);
                }
                info!("Stored recommendations of user {} are all out of stock, regenerating", user_id);
            }
            Ok(_) => {}
            Err(e) => warn!("Recommendation store read failed for user {}: {}", user_id, e),
        }

        let response = RecommendationResponse::new(user_id, self.rank(user_id).await.into_recommendations());
        if !response.recommendations.is_empty() {
            self.store.save(&response).await?;
        }
        Ok(response)
    }

    async fn gate_stored(&self, mut response: RecommendationResponse) -> Option<RecommendationResponse> {
        let ctx = BusinessContext {
            stock: self
                .business_data
                .stock_levels()
                .await
                .map_err(|e| warn!("Stock query failed, serving stored list ungated: {}", e))
                .ok(),
            ..Default::default()
        };
        response.recommendations.retain(|r| ctx.has_stock(r.item_id));
        response.recommendations.truncate(self.top_n);
        (!response.recommendations.is_empty()).then_some(response)
    }

    /// Validates and persists a user's preferences, then retrains so the
    /// next ranking sees them.
    pub async fn on_preferences_changed(
        &self,
        user_id: UserId,
        updates: Vec<PreferenceUpdate>,
    ) -> EngineResult<RefreshOutcome> {
        validate_preferences(&updates)?;
        let rows: Vec<PreferenceRow> = updates.into_iter().map(|u| u.into_row(user_id)).collect();

        self.feature_store.save_preferences(user_id, rows).await?;
        if let Err(e) = self.store.invalidate(user_id).await {
            warn!("Could not invalidate stored recommendations for user {}: {}", user_id, e);
        }

        self.training.refresh_models().await
    }

    pub fn serving_stats(&self) -> HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn record(&self, path: &str) {
        *self.serving_stats.entry(path.to_string()).or_insert(0) += 1;
    }
}
