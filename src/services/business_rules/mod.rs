use crate::config::BusinessRuleConfig;
use crate::error::EngineResult;
use crate::models::{CategoryId, ItemId, Reason, ScoredCandidate};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Live business data consulted at ranking time.
#[async_trait::async_trait]
pub trait BusinessDataSource: Send + Sync {
    async fn active_promotions(&self, now: DateTime<Utc>) -> EngineResult<HashSet<ItemId>>;
    async fn stock_levels(&self) -> EngineResult<HashMap<ItemId, f64>>;
}

/// Per-request inputs of the business rules. A `None` section means its query
/// failed and the matching rule is skipped.
#[derive(Debug, Clone, Default)]
pub struct BusinessContext {
    pub dietary_restrictions: HashSet<CategoryId>,
    pub promotions: Option<HashSet<ItemId>>,
    pub stock: Option<HashMap<ItemId, f64>>,
}

impl BusinessContext {
    pub async fn load(
        source: &dyn BusinessDataSource,
        dietary_restrictions: HashSet<CategoryId>,
        now: DateTime<Utc>,
    ) -> Self {
        let (promotions, stock) = futures::join!(source.active_promotions(now), source.stock_levels());

        let promotions = promotions
            .map_err(|e| warn!("Promotion query failed, skipping promotion boost: {}", e))
            .ok();
        let stock = stock
            .map_err(|e| warn!("Stock query failed, skipping inventory rules: {}", e))
            .ok();

        Self {
            dietary_restrictions,
            promotions,
            stock,
        }
    }

    /// False only when stock data was fetched and the item has none.
    pub fn has_stock(&self, item_id: ItemId) -> bool {
        self.stock_of(item_id).map_or(true, |q| q > 0.0)
    }

    fn stock_of(&self, item_id: ItemId) -> Option<f64> {
        self.stock
            .as_ref()
            .map(|levels| levels.get(&item_id).copied().unwrap_or(0.0))
    }
}

#[derive(Debug, Clone)]
pub struct BusinessRuleFilter {
    config: BusinessRuleConfig,
}

impl BusinessRuleFilter {
    pub fn new(config: BusinessRuleConfig) -> Self {
        Self { config }
    }

    /// Dietary penalty, then promotion boost, then inventory gating.
    pub fn apply(&self, candidates: Vec<ScoredCandidate>, ctx: &BusinessContext) -> Vec<ScoredCandidate> {
        let mut candidates = candidates;

        if !ctx.dietary_restrictions.is_empty() {
            info!("Applying dietary restrictions: {:?}", ctx.dietary_restrictions);
            for candidate in candidates.iter_mut() {
                if candidate
                    .category_ids
                    .iter()
                    .any(|id| ctx.dietary_restrictions.contains(id))
                {
                    candidate.score *= self.config.dietary_penalty;
                }
            }
        }

        if let Some(promotions) = ctx.promotions.as_ref().filter(|p| !p.is_empty()) {
            for candidate in candidates.iter_mut() {
                if promotions.contains(&candidate.item_id) {
                    candidate.score += self.config.promotion_boost;
                    candidate.reason = Reason::SpecialPromotion;
                }
            }
        }

        let mut candidates = self.in_stock(candidates, ctx);
        for candidate in candidates.iter_mut() {
            if let Some(quantity) = ctx.stock_of(candidate.item_id) {
                if quantity < self.config.low_stock_threshold {
                    candidate.score *= self.config.low_stock_penalty;
                }
            }
        }
        candidates
    }

    /// Inventory exclusion only: drops items without stock, scores untouched.
    pub fn in_stock(&self, candidates: Vec<ScoredCandidate>, ctx: &BusinessContext) -> Vec<ScoredCandidate> {
        if ctx.stock.is_none() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|c| ctx.has_stock(c.item_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn candidate(item_id: ItemId, category_id: CategoryId, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            item_id,
            name: format!("Dish {}", item_id),
            category: format!("Category {}", category_id),
            category_ids: vec![category_id],
            score,
            reason: Reason::Hybrid,
            popularity: 1.0,
        }
    }

    fn full_stock(items: &[ItemId]) -> Option<HashMap<ItemId, f64>> {
        Some(items.iter().map(|&id| (id, 100.0)).collect())
    }

    fn filter() -> BusinessRuleFilter {
        BusinessRuleFilter::new(BusinessRuleConfig::default())
    }

    #[test]
    fn test_dietary_restriction_halves_score() {
        let ctx = BusinessContext {
            dietary_restrictions: [18].into_iter().collect(),
            promotions: None,
            stock: full_stock(&[1, 2]),
        };
        let out = filter().apply(vec![candidate(1, 18, 0.8), candidate(2, 3, 0.8)], &ctx);
        assert_eq!(out[0].score, 0.4);
        assert_eq!(out[1].score, 0.8);
    }

    #[test]
    fn test_promotion_boosts_and_relabels() {
        let ctx = BusinessContext {
            dietary_restrictions: HashSet::new(),
            promotions: Some([2].into_iter().collect()),
            stock: full_stock(&[1, 2]),
        };
        let out = filter().apply(vec![candidate(1, 1, 0.5), candidate(2, 1, 0.5)], &ctx);
        assert_eq!(out[1].score, 1.5);
        assert_eq!(out[1].reason, Reason::SpecialPromotion);
        assert_eq!(out[0].reason, Reason::Hybrid);
    }

    #[test]
    fn test_inventory_excludes_empty_and_penalizes_low_stock() {
        let stock: HashMap<ItemId, f64> = [(1, 3.0), (2, 0.0), (3, 50.0)].into_iter().collect();
        let ctx = BusinessContext {
            dietary_restrictions: HashSet::new(),
            promotions: None,
            stock: Some(stock),
        };
        let out = filter().apply(
            vec![candidate(1, 1, 0.6), candidate(2, 1, 0.9), candidate(3, 1, 0.2), candidate(4, 1, 0.7)],
            &ctx,
        );
        let ids: Vec<ItemId> = out.iter().map(|c| c.item_id).collect();
        // item 4 has no stock record and counts as out of stock
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(out[0].score, 0.3);
        assert_eq!(out[1].score, 0.2);
    }

    #[test]
    fn test_promoted_item_still_gated_by_inventory() {
        let ctx = BusinessContext {
            dietary_restrictions: HashSet::new(),
            promotions: Some([1].into_iter().collect()),
            stock: Some([(1, 0.0)].into_iter().collect()),
        };
        assert!(filter().apply(vec![candidate(1, 1, 0.5)], &ctx).is_empty());
    }

    #[test]
    fn test_failed_queries_skip_rules() {
        let ctx = BusinessContext::default();
        let out = filter().apply(vec![candidate(1, 1, 0.5)], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.5);
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl BusinessDataSource for FailingSource {
        async fn active_promotions(&self, _now: DateTime<Utc>) -> EngineResult<HashSet<ItemId>> {
            Err(EngineError::FilterQuery("promotions offline".to_string()))
        }

        async fn stock_levels(&self) -> EngineResult<HashMap<ItemId, f64>> {
            Ok([(1, 2.0)].into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_context_degrades_per_query() {
        let ctx = BusinessContext::load(&FailingSource, HashSet::new(), Utc::now()).await;
        assert!(ctx.promotions.is_none());
        assert_eq!(ctx.stock_of(1), Some(2.0));
        assert_eq!(ctx.stock_of(9), Some(0.0));
    }
}
