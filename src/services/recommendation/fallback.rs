use super::ranker::{candidate_for, HybridRanker, RankPath};
use crate::algorithms::diversity::by_score_desc;
use crate::models::{ItemId, PreferenceRow, Reason, ScoredCandidate, UserId};
use crate::services::business_rules::BusinessContext;
use crate::services::snapshot::ModelSnapshot;
use tracing::debug;

/// Preference scores normalized to sum to one; uniform when they sum to
/// nothing positive.
pub fn preference_weights(rows: &[PreferenceRow]) -> Vec<f64> {
    let total: f64 = rows.iter().map(|r| r.preference_score).sum();
    if total > 0.0 && total.is_finite() {
        rows.iter().map(|r| r.preference_score / total).collect()
    } else {
        vec![1.0 / rows.len().max(1) as f64; rows.len()]
    }
}

impl HybridRanker {
    /// Favorite-item similarity, else preferred categories. `None` when
    /// neither resolves against the current catalog.
    pub fn preference_based(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        ctx: &BusinessContext,
    ) -> Option<(RankPath, Vec<ScoredCandidate>)> {
        let rows = snapshot.preferences.rows(user_id);
        let weights = preference_weights(rows);

        if let Some(ranked) = self.by_favorite_items(snapshot, rows, &weights, ctx) {
            return Some((RankPath::FavoriteItems, ranked));
        }
        self.by_preferred_categories(snapshot, rows, &weights, ctx)
            .map(|ranked| (RankPath::PreferredCategories, ranked))
    }

    fn by_favorite_items(
        &self,
        snapshot: &ModelSnapshot,
        rows: &[PreferenceRow],
        weights: &[f64],
        ctx: &BusinessContext,
    ) -> Option<Vec<ScoredCandidate>> {
        let model = snapshot.content.as_ref()?;
        let favorites: Vec<(ItemId, f64)> = rows
            .iter()
            .zip(weights)
            .filter_map(|(row, &w)| row.favorite_item.map(|item| (item, w)))
            .filter(|(item, _)| snapshot.document(*item).is_some())
            .collect();

        let similarity = model.weighted_similarity(&favorites)?;
        debug!("Scoring catalog against {} favorite items", favorites.len());

        let candidates = snapshot
            .documents()
            .iter()
            .filter_map(|doc| {
                let pos = model.position(doc.item_id)?;
                Some(candidate_for(snapshot, doc.item_id, similarity[pos], Reason::PreferenceBased))
            })
            .collect();

        Some(self.finish(candidates, ctx))
    }

    fn by_preferred_categories(
        &self,
        snapshot: &ModelSnapshot,
        rows: &[PreferenceRow],
        weights: &[f64],
        ctx: &BusinessContext,
    ) -> Option<Vec<ScoredCandidate>> {
        let categories: Vec<_> = rows
            .iter()
            .zip(weights)
            .filter_map(|(row, &w)| row.category_id.map(|c| (c, w)))
            .collect();
        if categories.is_empty() {
            return None;
        }

        let candidates: Vec<ScoredCandidate> = snapshot
            .documents()
            .iter()
            .filter_map(|doc| {
                let score: f64 = categories
                    .iter()
                    .filter(|(category, _)| doc.in_category(*category))
                    .map(|(_, w)| w)
                    .sum();
                (score > 0.0)
                    .then(|| candidate_for(snapshot, doc.item_id, score, Reason::CategoryPreference))
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }
        Some(self.finish(candidates, ctx))
    }

    fn finish(&self, candidates: Vec<ScoredCandidate>, ctx: &BusinessContext) -> Vec<ScoredCandidate> {
        let mut ranked = self.rules.apply(candidates, ctx);
        ranked.sort_by(by_score_desc);
        ranked.truncate(self.config.top_n);
        ranked
    }

    /// Catalog by popularity, ties broken by item id. Only items out of
    /// stock are removed at this tier.
    pub fn popular(&self, snapshot: &ModelSnapshot, ctx: &BusinessContext) -> Vec<ScoredCandidate> {
        let mut candidates: Vec<ScoredCandidate> = snapshot
            .documents()
            .iter()
            .map(|doc| candidate_for(snapshot, doc.item_id, doc.popularity, Reason::PopularDish))
            .collect();
        candidates.sort_by(by_score_desc);

        let mut ranked = self.rules.in_stock(candidates, ctx);
        ranked.truncate(self.config.top_n);
        ranked
    }
}
