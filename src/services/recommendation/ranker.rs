use crate::algorithms::diversity::{apply_jitter, balance_categories, PopularityContainment};
use crate::config::{Config, RecommendationConfig};
use crate::models::{ItemId, RankOutcome, Reason, ScoredCandidate, UserId};
use crate::services::business_rules::{BusinessContext, BusinessRuleFilter};
use crate::services::snapshot::ModelSnapshot;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Tier of the fallback chain that produced a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankPath {
    Hybrid,
    FavoriteItems,
    PreferredCategories,
    Popular,
}

impl RankPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankPath::Hybrid => "hybrid",
            RankPath::FavoriteItems => "favorite_items",
            RankPath::PreferredCategories => "preferred_categories",
            RankPath::Popular => "popular",
        }
    }
}

/// CF weight from a user's total interaction mass, linear between the
/// activity thresholds and clamped to the configured bounds. The CBF weight
/// is its complement.
pub fn dynamic_weights(activity: f64, config: &RecommendationConfig) -> (f64, f64) {
    let (low, high) = (config.low_activity_threshold, config.high_activity_threshold);
    let (min_w, max_w) = (config.min_cf_weight, config.max_cf_weight);

    let alpha = if activity <= low {
        min_w
    } else if activity >= high {
        max_w
    } else {
        min_w + (max_w - min_w) * (activity - low) / (high - low)
    };
    (alpha, 1.0 - alpha)
}

/// Pure ranking pass over one snapshot. All I/O happens before it is called.
#[derive(Debug, Clone)]
pub struct HybridRanker {
    pub(crate) config: RecommendationConfig,
    pub(crate) rules: BusinessRuleFilter,
}

impl HybridRanker {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.recommendation.clone(),
            rules: BusinessRuleFilter::new(config.business_rules.clone()),
        }
    }

    /// Walks the fallback chain: hybrid for users with interactions, then
    /// stored preferences, then popularity.
    pub fn rank<R: Rng + ?Sized>(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        ctx: &BusinessContext,
        rng: &mut R,
    ) -> (RankPath, RankOutcome) {
        if snapshot.interactions.contains_user(user_id) {
            let ranked = self.hybrid(snapshot, user_id, ctx, rng);
            return (RankPath::Hybrid, RankOutcome::from_candidates(ranked));
        }

        if snapshot.preferences.has_user(user_id) {
            if let Some((path, ranked)) = self.preference_based(snapshot, user_id, ctx) {
                return (path, RankOutcome::from_candidates(ranked));
            }
            debug!("Preferences of user {} matched nothing, using popularity", user_id);
        }

        (RankPath::Popular, RankOutcome::from_candidates(self.popular(snapshot, ctx)))
    }

    pub fn hybrid<R: Rng + ?Sized>(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        ctx: &BusinessContext,
        rng: &mut R,
    ) -> Vec<ScoredCandidate> {
        let interactions = &snapshot.interactions;

        let cf: HashMap<ItemId, f64> = match snapshot.factors.as_ref() {
            Some(factors) => match factors.predict_all(user_id) {
                Some(scores) => scores.into_iter().collect(),
                None => {
                    warn!("User {} has no latent factors, CF contributes nothing", user_id);
                    HashMap::new()
                }
            },
            None => {
                warn!("No collaborative filtering model available, CF contributes nothing");
                HashMap::new()
            }
        };

        let purchased = interactions.purchased_items(user_id);
        let cbf: HashMap<ItemId, f64> = snapshot
            .content
            .as_ref()
            .and_then(|model| {
                model.mean_similarity(&purchased).map(|row| {
                    model
                        .item_ids()
                        .iter()
                        .copied()
                        .zip(row.iter().copied())
                        .collect()
                })
            })
            .unwrap_or_default();

        let mut universe: BTreeSet<ItemId> = interactions.items().iter().copied().collect();
        if let Some(model) = snapshot.content.as_ref() {
            universe.extend(model.item_ids().iter().copied());
        }

        let (alpha, beta) = dynamic_weights(interactions.activity(user_id), &self.config);
        debug!("User {} weights: cf={:.3} cbf={:.3}", user_id, alpha, beta);

        let purchased: HashSet<ItemId> = purchased.into_iter().collect();
        let candidates: Vec<ScoredCandidate> = universe
            .into_iter()
            .filter(|id| !purchased.contains(id))
            .map(|item_id| {
                let score = alpha * cf.get(&item_id).copied().unwrap_or(0.0)
                    + beta * cbf.get(&item_id).copied().unwrap_or(0.0);
                candidate_for(snapshot, item_id, score, Reason::Hybrid)
            })
            .collect();

        let containment = PopularityContainment {
            cap_quantile: self.config.popularity_cap_quantile,
            penalty_quantile: self.config.popularity_penalty_quantile,
            penalty: self.config.popularity_penalty,
        };
        let mut candidates = containment.apply(candidates);
        apply_jitter(&mut candidates, self.config.jitter, rng);

        let candidates = self.rules.apply(candidates, ctx);
        balance_categories(candidates, self.config.top_n, self.config.max_per_category)
    }
}

/// Candidate for `item_id`, filling display fields from the catalog. Items
/// absent from the catalog get an empty label and zero popularity.
pub(crate) fn candidate_for(
    snapshot: &ModelSnapshot,
    item_id: ItemId,
    score: f64,
    reason: Reason,
) -> ScoredCandidate {
    match snapshot.document(item_id) {
        Some(doc) => ScoredCandidate {
            item_id,
            name: doc.name.clone(),
            category: doc.category.clone(),
            category_ids: doc.category_ids.clone(),
            score,
            reason,
            popularity: doc.popularity,
        },
        None => ScoredCandidate {
            item_id,
            name: String::new(),
            category: String::new(),
            category_ids: Vec::new(),
            score,
            reason,
            popularity: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_weights_bounds_and_midpoint() {
        let config = RecommendationConfig::default();
        assert_eq!(dynamic_weights(0.0, &config).0, 0.3);
        assert_eq!(dynamic_weights(5.0, &config).0, 0.3);
        assert_eq!(dynamic_weights(20.0, &config).0, 0.7);
        assert_eq!(dynamic_weights(100.0, &config).0, 0.7);

        let (alpha, beta) = dynamic_weights(12.5, &config);
        assert!((alpha - 0.5).abs() < 1e-12);
        assert!((alpha + beta - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dynamic_weights_monotone() {
        let config = RecommendationConfig::default();
        let mut previous = 0.0;
        for step in 0..=60 {
            let (alpha, beta) = dynamic_weights(step as f64 * 0.5, &config);
            assert!(alpha >= previous);
            assert!((0.3..=0.7).contains(&alpha));
            assert!((alpha + beta - 1.0).abs() < 1e-12);
            previous = alpha;
        }
    }
}
