use crate::algorithms::content::ContentDocument;
use crate::algorithms::tfidf::{sparse_dot, SparseVector, TfidfVectorizer};
use crate::config::ContentConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::ItemId;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

/// TF-IDF state plus the dense item×item cosine similarity matrix.
///
/// The full matrix is materialized up front, which is O(n²) in the catalog
/// size.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentModel {
    vectorizer: TfidfVectorizer,
    item_ids: Vec<ItemId>,
    item_index: HashMap<ItemId, usize>,
    similarity: Array2<f64>,
}

impl ContentModel {
    pub fn train(documents: &[ContentDocument], config: &ContentConfig) -> EngineResult<Self> {
        if documents.is_empty() {
            return Err(EngineError::ModelTraining("no content documents to vectorize".to_string()));
        }

        info!("Training content-based filtering model on {} documents", documents.len());

        let texts: Vec<&str> = documents.iter().map(|d| d.combined_features.as_str()).collect();
        let mut vectorizer = TfidfVectorizer::new(config.max_df, config.min_df);
        let vectors = vectorizer.fit_transform(&texts)?;
        let similarity = cosine_similarity_matrix(&vectors);

        let item_ids: Vec<ItemId> = documents.iter().map(|d| d.item_id).collect();
        let item_index = item_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        info!(
            "Content-based filtering model trained successfully, vocabulary size {}",
            vectorizer.vocabulary_size()
        );

        Ok(Self {
            vectorizer,
            item_ids,
            item_index,
            similarity,
        })
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn similarity_matrix(&self) -> &Array2<f64> {
        &self.similarity
    }

    pub fn position(&self, item_id: ItemId) -> Option<usize> {
        self.item_index.get(&item_id).copied()
    }

    pub fn similarity(&self, a: ItemId, b: ItemId) -> Option<f64> {
        Some(self.similarity[(self.position(a)?, self.position(b)?)])
    }

    pub fn row(&self, item_id: ItemId) -> Option<ArrayView1<'_, f64>> {
        self.position(item_id).map(|idx| self.similarity.row(idx))
    }

    /// Mean similarity row over `items`; `None` when none of them are known.
    pub fn mean_similarity(&self, items: &[ItemId]) -> Option<Array1<f64>> {
        let rows: Vec<usize> = items.iter().filter_map(|&id| self.position(id)).collect();
        if rows.is_empty() {
            return None;
        }
        self.similarity.select(Axis(0), &rows).mean_axis(Axis(0))
    }

    /// Weighted sum of similarity rows; unknown items are skipped.
    pub fn weighted_similarity(&self, weighted_items: &[(ItemId, f64)]) -> Option<Array1<f64>> {
        let mut acc = Array1::<f64>::zeros(self.item_ids.len());
        let mut matched = false;
        for &(item_id, weight) in weighted_items {
            if let Some(row) = self.row(item_id) {
                acc.scaled_add(weight, &row);
                matched = true;
            }
        }
        matched.then_some(acc)
    }
}

/// Pairwise cosine similarity of L2-normalized rows, clamped to `[0, 1]` with a unit diagonal.
pub fn cosine_similarity_matrix(vectors: &[SparseVector]) -> Array2<f64> {
    let n = vectors.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        1.0
                    } else {
                        sparse_dot(&vectors[i], &vectors[j]).clamp(0.0, 1.0)
                    }
                })
                .collect()
        })
        .collect();

    Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::content::build_documents;
    use crate::models::ItemFeatureRow;

    fn docs() -> Vec<ContentDocument> {
        let dishes = [
            (1, "Green Curry", "Thai", "coconut chili"),
            (2, "Red Curry", "Thai", "coconut chili"),
            (3, "Caesar Salad", "Salad", "lettuce parmesan"),
            (4, "Greek Salad", "Salad", "lettuce feta"),
            (5, "Margherita", "Pizza", "tomato mozzarella"),
        ];
        let rows: Vec<ItemFeatureRow> = dishes
            .iter()
            .map(|&(id, name, category, ingredient)| ItemFeatureRow {
                item_id: id,
                name: name.to_string(),
                category: Some(category.to_string()),
                ingredient: Some(ingredient.to_string()),
                ..Default::default()
            })
            .collect();
        build_documents(&rows)
    }

    #[test]
    fn test_similarity_is_symmetric_bounded_with_unit_diagonal() {
        let model = ContentModel::train(&docs(), &ContentConfig::default()).unwrap();
        let sim = model.similarity_matrix();
        assert_eq!(sim.dim(), (5, 5));
        for i in 0..5 {
            assert_eq!(sim[(i, i)], 1.0);
            for j in 0..5 {
                assert!((sim[(i, j)] - sim[(j, i)]).abs() < 1e-12);
                assert!((0.0..=1.0).contains(&sim[(i, j)]));
            }
        }
    }

    #[test]
    fn test_similar_dishes_score_higher() {
        let model = ContentModel::train(&docs(), &ContentConfig::default()).unwrap();
        let curry_pair = model.similarity(1, 2).unwrap();
        let curry_salad = model.similarity(1, 3).unwrap();
        assert!(curry_pair > curry_salad);
        // pizza shares no retained term with anything
        assert_eq!(model.similarity(5, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_mean_similarity_over_known_items() {
        let model = ContentModel::train(&docs(), &ContentConfig::default()).unwrap();
        let mean = model.mean_similarity(&[1, 3, 99]).unwrap();
        let row1 = model.row(1).unwrap();
        let row3 = model.row(3).unwrap();
        for j in 0..5 {
            assert!((mean[j] - (row1[j] + row3[j]) / 2.0).abs() < 1e-12);
        }
        assert!(model.mean_similarity(&[99]).is_none());
    }

    #[test]
    fn test_training_is_reproducible() {
        let a = ContentModel::train(&docs(), &ContentConfig::default()).unwrap();
        let b = ContentModel::train(&docs(), &ContentConfig::default()).unwrap();
        assert_eq!(a.similarity_matrix(), b.similarity_matrix());
    }

    #[test]
    fn test_empty_catalog_fails() {
        assert!(ContentModel::train(&[], &ContentConfig::default()).is_err());
    }
}
