use crate::algorithms::initializer::{gaussian_matrix, seeded_rng};
use crate::algorithms::interaction::InteractionMatrix;
use crate::error::{EngineError, EngineResult};
use crate::models::{ItemId, UserId};
use nalgebra::DMatrix;
use ndarray::Array2;
use rand::Rng;
use std::collections::HashMap;
use tracing::info;

const OVERSAMPLES: usize = 10;
const POWER_ITERATIONS: usize = 5;

/// Low-rank user and item embeddings from a truncated SVD of the interaction matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentFactors {
    user_index: HashMap<UserId, usize>,
    item_ids: Vec<ItemId>,
    item_index: HashMap<ItemId, usize>,
    /// users × k, already scaled by the singular values
    user_factors: Array2<f64>,
    /// items × k
    item_factors: Array2<f64>,
    singular_values: Vec<f64>,
}

/// `min(requested, min(rows, cols) - 1)`; zero means the matrix is too small to factorize.
pub fn effective_rank(requested: usize, rows: usize, cols: usize) -> usize {
    requested.min(rows.min(cols).saturating_sub(1))
}

impl LatentFactors {
    pub fn train(matrix: &InteractionMatrix, k_requested: usize, seed: u64) -> EngineResult<Self> {
        if matrix.is_empty() {
            return Err(EngineError::ModelTraining("interaction matrix is empty".to_string()));
        }

        let (rows, cols) = matrix.shape();
        let k = effective_rank(k_requested, rows, cols);
        if k == 0 {
            return Err(EngineError::ModelTraining(format!(
                "cannot factorize a {}x{} matrix, need at least 2 rows and 2 columns",
                rows, cols
            )));
        }

        info!("Training collaborative filtering model with k={} on {}x{} matrix", k, rows, cols);

        let values = matrix.values();
        let a = DMatrix::from_fn(rows, cols, |r, c| values[(r, c)]);
        let mut rng = seeded_rng(seed);
        let (u, s, vt) = randomized_svd(&a, k, &mut rng)?;

        let user_factors = Array2::from_shape_fn((rows, k), |(r, j)| u[(r, j)] * s[j]);
        let item_factors = Array2::from_shape_fn((cols, k), |(c, j)| vt[(j, c)]);

        let user_index = matrix.users().iter().enumerate().map(|(i, &u)| (u, i)).collect();
        let item_ids = matrix.items().to_vec();
        let item_index = item_ids.iter().enumerate().map(|(i, &it)| (it, i)).collect();

        info!("Collaborative filtering model trained successfully");
        Ok(Self {
            user_index,
            item_ids,
            item_index,
            user_factors,
            item_factors,
            singular_values: s,
        })
    }

    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn user_factor(&self, user_id: UserId) -> Option<Vec<f64>> {
        self.user_index
            .get(&user_id)
            .map(|&idx| self.user_factors.row(idx).to_vec())
    }

    pub fn predict(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        let u = *self.user_index.get(&user_id)?;
        let i = *self.item_index.get(&item_id)?;
        Some(self.user_factors.row(u).dot(&self.item_factors.row(i)))
    }

    /// Predicted affinity of `user_id` for every item the model knows.
    pub fn predict_all(&self, user_id: UserId) -> Option<Vec<(ItemId, f64)>> {
        let u = *self.user_index.get(&user_id)?;
        let scores = self.item_factors.dot(&self.user_factors.row(u));
        Some(self.item_ids.iter().copied().zip(scores.iter().copied()).collect())
    }
}

fn orthonormal_basis(m: DMatrix<f64>) -> DMatrix<f64> {
    m.qr().q()
}

/// Randomized range finder followed by an exact SVD of the projected matrix.
///
/// Returns `(U, S, Vt)` truncated to `k` components, ordered by descending
/// singular value, with signs fixed so the largest-magnitude entry of each
/// `Vt` row is positive.
fn randomized_svd<R: Rng + ?Sized>(
    a: &DMatrix<f64>,
    k: usize,
    rng: &mut R,
) -> EngineResult<(DMatrix<f64>, Vec<f64>, DMatrix<f64>)> {
    let (m, n) = a.shape();
    let l = (k + OVERSAMPLES).min(m.min(n));

    let omega = gaussian_matrix(n, l, rng);
    let mut q = orthonormal_basis(a * omega);
    for _ in 0..POWER_ITERATIONS {
        q = orthonormal_basis(a.transpose() * &q);
        q = orthonormal_basis(a * &q);
    }

    let b = q.transpose() * a;
    let svd = b.svd(true, true);
    let u_b = svd
        .u
        .ok_or_else(|| EngineError::ModelTraining("SVD did not produce U".to_string()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| EngineError::ModelTraining("SVD did not produce Vt".to_string()))?;
    let singular = svd.singular_values;

    if singular.iter().any(|s| !s.is_finite()) {
        return Err(EngineError::ModelTraining("non-finite singular values".to_string()));
    }

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&x, &y| singular[y].total_cmp(&singular[x]));
    order.truncate(k);

    let u_full = q * u_b;
    let mut u = DMatrix::<f64>::zeros(m, k);
    let mut vt = DMatrix::<f64>::zeros(k, n);
    let mut s = Vec::with_capacity(k);

    for (j, &src) in order.iter().enumerate() {
        let pivot = (0..n)
            .max_by(|&x, &y| v_t[(src, x)].abs().total_cmp(&v_t[(src, y)].abs()))
            .unwrap_or(0);
        let sign = if v_t[(src, pivot)] < 0.0 { -1.0 } else { 1.0 };

        for r in 0..m {
            u[(r, j)] = u_full[(r, src)] * sign;
        }
        for c in 0..n {
            vt[(j, c)] = v_t[(src, c)] * sign;
        }
        s.push(singular[src]);
    }

    Ok((u, s, vt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoteAggregation;
    use crate::models::RatingRow;

    fn matrix_from(ratings: &[(UserId, ItemId, f64)]) -> InteractionMatrix {
        let rows: Vec<RatingRow> = ratings
            .iter()
            .map(|&(user_id, item_id, rating)| RatingRow { user_id, item_id, rating })
            .collect();
        InteractionMatrix::build(&rows, &[], VoteAggregation::Mean)
    }

    #[test]
    fn test_effective_rank_clips_to_matrix() {
        assert_eq!(effective_rank(50, 2, 3), 1);
        assert_eq!(effective_rank(2, 10, 10), 2);
        assert_eq!(effective_rank(50, 1, 9), 0);
    }

    #[test]
    fn test_two_by_three_matrix_trains_single_factor() {
        let matrix = matrix_from(&[(1, 10, 5.0), (1, 20, 3.0), (2, 20, 4.0), (2, 30, 5.0)]);
        let factors = LatentFactors::train(&matrix, 50, 42).unwrap();

        assert_eq!(factors.rank(), 1);
        assert_eq!(factors.user_factor(1).unwrap().len(), 1);
        assert!(factors.predict(1, 30).is_some());
        assert!(factors.predict(3, 30).is_none());
    }

    #[test]
    fn test_rank_one_matrix_is_reconstructed() {
        let matrix = matrix_from(&[
            (1, 10, 1.0), (1, 20, 2.0), (1, 30, 3.0),
            (2, 10, 2.0), (2, 20, 4.0), (2, 30, 6.0),
        ]);
        let factors = LatentFactors::train(&matrix, 50, 42).unwrap();

        for &(user, item, expected) in &[(1, 10, 1.0), (1, 30, 3.0), (2, 20, 4.0), (2, 30, 6.0)] {
            let predicted = factors.predict(user, item).unwrap();
            assert!((predicted - expected).abs() < 1e-9, "{} vs {}", predicted, expected);
        }
    }

    #[test]
    fn test_training_is_deterministic_for_fixed_seed() {
        let matrix = matrix_from(&[
            (1, 10, 5.0), (1, 20, 1.0), (2, 20, 4.0), (2, 30, 2.0),
            (3, 10, 3.0), (3, 30, 5.0), (4, 40, 4.0), (4, 10, 1.0),
        ]);
        let a = LatentFactors::train(&matrix, 2, 42).unwrap();
        let b = LatentFactors::train(&matrix, 2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rank(), 2);
        assert!(a.singular_values()[0] >= a.singular_values()[1]);
    }

    #[test]
    fn test_degenerate_matrices_fail_training() {
        assert!(LatentFactors::train(&InteractionMatrix::empty(), 50, 42).is_err());

        let single_user = matrix_from(&[(1, 10, 5.0), (1, 20, 3.0)]);
        assert!(matches!(
            LatentFactors::train(&single_user, 50, 42),
            Err(EngineError::ModelTraining(_))
        ));
    }

    #[test]
    fn test_predict_all_covers_every_item() {
        let matrix = matrix_from(&[(1, 10, 5.0), (1, 20, 3.0), (2, 20, 4.0), (2, 30, 5.0)]);
        let factors = LatentFactors::train(&matrix, 50, 42).unwrap();
        let scores = factors.predict_all(2).unwrap();
        let ids: Vec<ItemId> = scores.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }
}
