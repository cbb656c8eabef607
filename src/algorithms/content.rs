use crate::models::{CategoryId, ItemFeatureRow, ItemId};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentDocument {
    pub item_id: ItemId,
    pub name: String,
    /// Distinct category names joined by spaces; doubles as the diversity label,
    /// so a dish filed under "Curry" and "Spicy" is capped apart from plain "Curry".
    pub category: String,
    pub category_ids: Vec<CategoryId>,
    pub combined_features: String,
    pub order_count: f64,
    pub average_rating: f64,
    pub popularity: f64,
}

impl ContentDocument {
    pub fn in_category(&self, category_id: CategoryId) -> bool {
        self.category_ids.contains(&category_id)
    }
}

pub fn popularity(order_count: f64, average_rating: f64) -> f64 {
    order_count + 2.0 * average_rating
}

#[derive(Default)]
struct DocumentAccumulator {
    name: String,
    categories: Vec<String>,
    category_ids: Vec<CategoryId>,
    ingredients: Vec<String>,
    features: Vec<String>,
    order_count: Option<i64>,
    average_rating: Option<f64>,
}

fn push_distinct(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
}

/// Collapses fan-out feature rows into one document per item, ordered by item id.
pub fn build_documents(rows: &[ItemFeatureRow]) -> Vec<ContentDocument> {
    let mut grouped: BTreeMap<ItemId, DocumentAccumulator> = BTreeMap::new();

    for row in rows {
        let acc = grouped.entry(row.item_id).or_default();
        if acc.name.is_empty() {
            acc.name = row.name.trim().to_string();
        }
        push_distinct(&mut acc.categories, row.category.as_deref());
        push_distinct(&mut acc.ingredients, row.ingredient.as_deref());
        push_distinct(&mut acc.features, row.feature.as_deref());
        if let Some(id) = row.category_id {
            if !acc.category_ids.contains(&id) {
                acc.category_ids.push(id);
            }
        }
        if acc.order_count.is_none() {
            acc.order_count = row.order_count;
        }
        if acc.average_rating.is_none() {
            acc.average_rating = row.average_rating;
        }
    }

    let documents: Vec<ContentDocument> = grouped
        .into_iter()
        .map(|(item_id, acc)| {
            let category = acc.categories.join(" ");
            let ingredients = acc.ingredients.join(" ");
            let features = acc.features.join(" ");
            let combined_features = [
                acc.name.as_str(),
                category.as_str(),
                ingredients.as_str(),
                features.as_str(),
            ]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

            let order_count = acc.order_count.unwrap_or(0) as f64;
            let average_rating = acc.average_rating.filter(|r| r.is_finite()).unwrap_or(0.0);

            ContentDocument {
                item_id,
                name: acc.name,
                category,
                category_ids: acc.category_ids,
                combined_features,
                order_count,
                average_rating,
                popularity: popularity(order_count, average_rating),
            }
        })
        .collect();

    info!("Aggregated {} content documents from {} feature rows", documents.len(), rows.len());
    documents
}
