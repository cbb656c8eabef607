use crate::config::VoteAggregation;
use crate::models::{ItemId, OrderRow, RatingRow, UserId};
use ndarray::{Array2, ArrayView1};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

pub const MAX_AFFINITY: f64 = 5.0;

/// Dense user×item affinity table. Rows and columns are sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    users: Vec<UserId>,
    items: Vec<ItemId>,
    user_index: HashMap<UserId, usize>,
    item_index: HashMap<ItemId, usize>,
    values: Array2<f64>,
}

impl InteractionMatrix {
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            items: Vec::new(),
            user_index: HashMap::new(),
            item_index: HashMap::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    /// Merges explicit ratings and rescaled purchase counts into one matrix.
    ///
    /// Purchase counts are mapped onto `[0, 5]` by dividing by the largest
    /// count in the dataset. Both sources are unioned as independent votes
    /// before pivoting; `aggregation` decides how several votes for the same
    /// cell collapse into one value.
    pub fn build(ratings: &[RatingRow], orders: &[OrderRow], aggregation: VoteAggregation) -> Self {
        let mut votes: Vec<(UserId, ItemId, f64)> = ratings
            .iter()
            .map(|r| (r.user_id, r.item_id, r.rating))
            .collect();

        let max_purchases = orders.iter().map(|o| o.purchase_count).max().unwrap_or(0);
        if max_purchases > 0 {
            votes.extend(orders.iter().map(|o| {
                let normalized = o.purchase_count as f64 / max_purchases as f64 * MAX_AFFINITY;
                (o.user_id, o.item_id, normalized)
            }));
        }

        if votes.is_empty() {
            info!("No ratings or orders available, interaction matrix is empty");
            return Self::empty();
        }

        let users: Vec<UserId> = votes.iter().map(|v| v.0).collect::<BTreeSet<_>>().into_iter().collect();
        let items: Vec<ItemId> = votes.iter().map(|v| v.1).collect::<BTreeSet<_>>().into_iter().collect();
        let user_index: HashMap<UserId, usize> = users.iter().enumerate().map(|(i, &u)| (u, i)).collect();
        let item_index: HashMap<ItemId, usize> = items.iter().enumerate().map(|(i, &it)| (it, i)).collect();

        let mut sums = Array2::<f64>::zeros((users.len(), items.len()));
        let mut counts = Array2::<u32>::zeros((users.len(), items.len()));
        for (user, item, value) in votes {
            let cell = (user_index[&user], item_index[&item]);
            sums[cell] += value;
            counts[cell] += 1;
        }

        let values = match aggregation {
            VoteAggregation::Sum => sums,
            VoteAggregation::Mean => {
                let mut means = sums;
                for ((r, c), value) in means.indexed_iter_mut() {
                    let n = counts[(r, c)];
                    if n > 1 {
                        *value /= n as f64;
                    }
                }
                means
            }
        };

        info!(
            "User-item interaction matrix created: {} users x {} items",
            users.len(),
            items.len()
        );

        Self {
            users,
            items,
            user_index,
            item_index,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() || self.items.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.users.len(), self.items.len())
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn user_position(&self, user_id: UserId) -> Option<usize> {
        self.user_index.get(&user_id).copied()
    }

    pub fn item_position(&self, item_id: ItemId) -> Option<usize> {
        self.item_index.get(&item_id).copied()
    }

    pub fn user_row(&self, user_id: UserId) -> Option<ArrayView1<'_, f64>> {
        self.user_position(user_id).map(|idx| self.values.row(idx))
    }

    pub fn get(&self, user_id: UserId, item_id: ItemId) -> f64 {
        match (self.user_position(user_id), self.item_position(item_id)) {
            (Some(u), Some(i)) => self.values[(u, i)],
            _ => 0.0,
        }
    }

    /// Total interaction mass of a user, the activity signal for weighting.
    pub fn activity(&self, user_id: UserId) -> f64 {
        self.user_row(user_id).map(|row| row.sum()).unwrap_or(0.0)
    }

    /// Items the user has any positive signal for, in column order.
    pub fn purchased_items(&self, user_id: UserId) -> Vec<ItemId> {
        match self.user_row(user_id) {
            Some(row) => row
                .iter()
                .zip(self.items.iter())
                .filter(|(value, _)| **value > 0.0)
                .map(|(_, item)| *item)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user_id: UserId, item_id: ItemId, rating: f64) -> RatingRow {
        RatingRow { user_id, item_id, rating }
    }

    fn order(user_id: UserId, item_id: ItemId, purchase_count: i64) -> OrderRow {
        OrderRow { user_id, item_id, purchase_count }
    }

    #[test]
    fn test_two_users_three_items_pivot() {
        // A=1, B=2; X=10, Y=20, Z=30
        let ratings = vec![rating(1, 10, 5.0), rating(1, 20, 3.0), rating(2, 20, 4.0), rating(2, 30, 5.0)];
        let matrix = InteractionMatrix::build(&ratings, &[], VoteAggregation::Mean);

        assert_eq!(matrix.shape(), (2, 3));
        assert_eq!(matrix.get(1, 30), 0.0);
        assert_eq!(matrix.get(2, 10), 0.0);
        assert_eq!(matrix.get(1, 10), 5.0);
        assert_eq!(matrix.get(2, 20), 4.0);
        assert_eq!(matrix.activity(1), 8.0);
        assert_eq!(matrix.purchased_items(1), vec![10, 20]);
    }

    #[test]
    fn test_orders_rescaled_by_dataset_maximum() {
        let orders = vec![order(1, 10, 4), order(2, 10, 2), order(2, 20, 1)];
        let matrix = InteractionMatrix::build(&[], &orders, VoteAggregation::Mean);

        assert_eq!(matrix.get(1, 10), 5.0);
        assert_eq!(matrix.get(2, 10), 2.5);
        assert_eq!(matrix.get(2, 20), 1.25);
    }

    #[test]
    fn test_duplicate_votes_follow_aggregation() {
        let ratings = vec![rating(1, 10, 3.0)];
        let orders = vec![order(1, 10, 2), order(2, 20, 2)];

        let mean = InteractionMatrix::build(&ratings, &orders, VoteAggregation::Mean);
        assert_eq!(mean.get(1, 10), 4.0);

        let sum = InteractionMatrix::build(&ratings, &orders, VoteAggregation::Sum);
        assert_eq!(sum.get(1, 10), 8.0);
    }

    #[test]
    fn test_no_signal_builds_empty_matrix() {
        let matrix = InteractionMatrix::build(&[], &[], VoteAggregation::Mean);
        assert!(matrix.is_empty());
        assert_eq!(matrix.shape(), (0, 0));
        assert!(!matrix.contains_user(1));
        assert_eq!(matrix.activity(1), 0.0);
    }

    #[test]
    fn test_rebuild_is_reproducible() {
        let ratings = vec![rating(3, 7, 2.0), rating(1, 9, 4.0)];
        let orders = vec![order(3, 9, 3)];
        let a = InteractionMatrix::build(&ratings, &orders, VoteAggregation::Mean);
        let b = InteractionMatrix::build(&ratings, &orders, VoteAggregation::Mean);
        assert_eq!(a, b);
        assert_eq!(a.users(), &[1, 3]);
        assert_eq!(a.items(), &[7, 9]);
    }
}
