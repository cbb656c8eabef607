use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

pub type UserId = i64;
pub type ItemId = i64;
pub type CategoryId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingRow {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRow {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub purchase_count: i64,
}

/// One row per item per joined attribute, so a single item usually fans out
/// over several rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemFeatureRow {
    pub item_id: ItemId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub category: Option<String>,
    pub ingredient: Option<String>,
    pub feature: Option<String>,
    pub order_count: Option<i64>,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PreferenceRow {
    pub user_id: UserId,
    pub favorite_item: Option<ItemId>,
    pub dietary_restriction: Option<CategoryId>,
    pub category_id: Option<CategoryId>,
    pub preference_score: f64,
}

/// Preference payload as submitted by a user, before it is attached to a user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub favorite_item: Option<ItemId>,
    #[serde(default)]
    pub dietary_restriction: Option<CategoryId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default = "default_preference_score")]
    pub preference_score: f64,
}

fn default_preference_score() -> f64 {
    1.0
}

impl PreferenceUpdate {
    pub fn into_row(self, user_id: UserId) -> PreferenceRow {
        PreferenceRow {
            user_id,
            favorite_item: self.favorite_item,
            dietary_restriction: self.dietary_restriction,
            category_id: self.category_id,
            preference_score: self.preference_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "Hybrid Score with Dynamic Weights and Category Diversity")]
    Hybrid,
    #[serde(rename = "Preference-Based")]
    PreferenceBased,
    #[serde(rename = "Category-Based Preference")]
    CategoryPreference,
    #[serde(rename = "Popular Dish")]
    PopularDish,
    #[serde(rename = "Special Promotion")]
    SpecialPromotion,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Hybrid => "Hybrid Score with Dynamic Weights and Category Diversity",
            Reason::PreferenceBased => "Preference-Based",
            Reason::CategoryPreference => "Category-Based Preference",
            Reason::PopularDish => "Popular Dish",
            Reason::SpecialPromotion => "Special Promotion",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working unit of the ranker. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub item_id: ItemId,
    pub name: String,
    pub category: String,
    pub category_ids: Vec<CategoryId>,
    pub score: f64,
    pub reason: Reason,
    pub popularity: f64,
}

impl ScoredCandidate {
    pub fn into_recommendation(self) -> Recommendation {
        Recommendation {
            item_id: self.item_id,
            name: self.name,
            category: self.category,
            score: self.score,
            reason: self.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub name: String,
    pub category: String,
    pub score: f64,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    Ranked(Vec<Recommendation>),
    Empty,
    Unavailable(String),
}

impl RankOutcome {
    pub fn from_candidates(candidates: Vec<ScoredCandidate>) -> Self {
        if candidates.is_empty() {
            RankOutcome::Empty
        } else {
            RankOutcome::Ranked(
                candidates
                    .into_iter()
                    .map(ScoredCandidate::into_recommendation)
                    .collect(),
            )
        }
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        match self {
            RankOutcome::Ranked(items) => items,
            _ => &[],
        }
    }

    pub fn into_recommendations(self) -> Vec<Recommendation> {
        match self {
            RankOutcome::Ranked(items) => items,
            _ => Vec::new(),
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, RankOutcome::Ranked(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationResponse {
    pub fn new(user_id: UserId, recommendations: Vec<Recommendation>) -> Self {
        Self {
            user_id,
            recommendations,
            generated_at: Utc::now(),
        }
    }
}
