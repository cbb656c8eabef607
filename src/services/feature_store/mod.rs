use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::business_rules::BusinessDataSource;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Everything a snapshot rebuild extracts in one pass.
#[derive(Debug, Clone, Default)]
pub struct FeatureData {
    pub ratings: Vec<RatingRow>,
    pub orders: Vec<OrderRow>,
    pub item_features: Vec<ItemFeatureRow>,
    pub preferences: Vec<PreferenceRow>,
}

#[async_trait::async_trait]
pub trait FeatureStore: Send + Sync {
    async fn ratings(&self) -> EngineResult<Vec<RatingRow>>;
    async fn orders(&self) -> EngineResult<Vec<OrderRow>>;
    async fn item_features(&self) -> EngineResult<Vec<ItemFeatureRow>>;
    async fn preferences(&self) -> EngineResult<Vec<PreferenceRow>>;

    /// Replaces every preference row of `user_id` with `rows`.
    async fn save_preferences(&self, user_id: UserId, rows: Vec<PreferenceRow>) -> EngineResult<()>;

    async fn load_all(&self) -> EngineResult<FeatureData> {
        let (ratings, orders, item_features, preferences) = futures::try_join!(
            self.ratings(),
            self.orders(),
            self.item_features(),
            self.preferences()
        )?;
        debug!(
            "Extracted {} ratings, {} order aggregates, {} feature rows, {} preferences",
            ratings.len(),
            orders.len(),
            item_features.len(),
            preferences.len()
        );
        Ok(FeatureData {
            ratings,
            orders,
            item_features,
            preferences,
        })
    }
}

const RATINGS_SQL: &str = r#"
    SELECT c.user_id, r.dish_id AS item_id, r.rating::float8 AS rating
    FROM user_rating r
    JOIN customer c ON r.customer_id = c.customer_id
    WHERE r.rating IS NOT NULL
"#;

const ORDERS_SQL: &str = r#"
    SELECT c.user_id, oi.dish_id AS item_id, COUNT(*)::int8 AS purchase_count
    FROM orders o
    JOIN order_item oi ON o.order_id = oi.order_id
    JOIN customer c ON o.customer_id = c.customer_id
    WHERE o.status = 'Completed'
    GROUP BY c.user_id, oi.dish_id
"#;

// Order counts and ratings are aggregated before joining so the attribute
// fan-out does not inflate them.
const ITEM_FEATURES_SQL: &str = r#"
    SELECT d.dish_id AS item_id,
           d.name,
           dc.category_id,
           cat.name AS category,
           i.name AS ingredient,
           f.name AS feature,
           COALESCE(oc.order_count, 0)::int8 AS order_count,
           COALESCE(ar.average_rating, 0)::float8 AS average_rating
    FROM dish d
    LEFT JOIN dish_category dc ON d.dish_id = dc.dish_id
    LEFT JOIN category cat ON dc.category_id = cat.category_id
    LEFT JOIN dish_ingredient di ON d.dish_id = di.dish_id
    LEFT JOIN ingredient i ON di.ingredient_id = i.ingredient_id
    LEFT JOIN dish_feature_mapping fm ON d.dish_id = fm.dish_id
    LEFT JOIN dish_feature f ON fm.feature_id = f.feature_id
    LEFT JOIN (
        SELECT dish_id, COUNT(*) AS order_count FROM order_item GROUP BY dish_id
    ) oc ON d.dish_id = oc.dish_id
    LEFT JOIN (
        SELECT dish_id, AVG(rating) AS average_rating FROM user_rating GROUP BY dish_id
    ) ar ON d.dish_id = ar.dish_id
    ORDER BY d.dish_id
"#;

const PREFERENCES_SQL: &str = r#"
    SELECT user_id,
           favorite_dish AS favorite_item,
           dietary_restriction,
           category_id,
           preference_score::float8 AS preference_score
    FROM user_preference
"#;

const PROMOTIONS_SQL: &str = r#"
    SELECT special_dish_id
    FROM special_dish
    WHERE special_start_date <= $1 AND special_end_date >= $1
"#;

const STOCK_SQL: &str = r#"
    SELECT di.dish_id, SUM(s.quantity)::float8 AS total_quantity
    FROM dish_ingredient di
    JOIN storage s ON di.ingredient_id = s.ingredient_id
    GROUP BY di.dish_id
"#;

/// Postgres-backed feature extraction and business data.
pub struct PgFeatureStore {
    pool: PgPool,
}

impl PgFeatureStore {
    pub async fn connect(url: &str, max_connections: u32) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to Postgres feature store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FeatureStore for PgFeatureStore {
    async fn ratings(&self) -> EngineResult<Vec<RatingRow>> {
        Ok(sqlx::query_as::<_, RatingRow>(RATINGS_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn orders(&self) -> EngineResult<Vec<OrderRow>> {
        Ok(sqlx::query_as::<_, OrderRow>(ORDERS_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn item_features(&self) -> EngineResult<Vec<ItemFeatureRow>> {
        Ok(sqlx::query_as::<_, ItemFeatureRow>(ITEM_FEATURES_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn preferences(&self) -> EngineResult<Vec<PreferenceRow>> {
        Ok(sqlx::query_as::<_, PreferenceRow>(PREFERENCES_SQL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn save_preferences(&self, user_id: UserId, rows: Vec<PreferenceRow>) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_preference WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO user_preference \
                 (user_id, favorite_dish, dietary_restriction, category_id, preference_score) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(row.favorite_item)
            .bind(row.dietary_restriction)
            .bind(row.category_id)
            .bind(row.preference_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Stored {} preference rows for user {}", rows.len(), user_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BusinessDataSource for PgFeatureStore {
    async fn active_promotions(&self, now: DateTime<Utc>) -> EngineResult<HashSet<ItemId>> {
        let rows: Vec<(ItemId,)> = sqlx::query_as(PROMOTIONS_SQL)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::FilterQuery(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn stock_levels(&self) -> EngineResult<HashMap<ItemId, f64>> {
        let rows: Vec<(ItemId, Option<f64>)> = sqlx::query_as(STOCK_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::FilterQuery(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, quantity)| (id, quantity.unwrap_or(0.0)))
            .collect())
    }
}

const UNLIMITED_STOCK: f64 = 1.0e6;

/// In-process feature store, used by tests and local demos.
///
/// Business-data queries can be switched to fail to exercise rule skipping.
#[derive(Default)]
pub struct InMemoryFeatureStore {
    data: RwLock<FeatureData>,
    promotions: RwLock<HashSet<ItemId>>,
    stock: RwLock<Option<HashMap<ItemId, f64>>>,
    fail_promotions: AtomicBool,
    fail_stock: AtomicBool,
}

impl InMemoryFeatureStore {
    pub fn new(data: FeatureData) -> Self {
        Self {
            data: RwLock::new(data),
            ..Default::default()
        }
    }

    pub fn replace_data(&self, data: FeatureData) {
        *self.data.write() = data;
    }

    pub fn push_rating(&self, row: RatingRow) {
        self.data.write().ratings.push(row);
    }

    pub fn set_promotions(&self, items: impl IntoIterator<Item = ItemId>) {
        *self.promotions.write() = items.into_iter().collect();
    }

    /// `None` means every item is treated as plentifully stocked.
    pub fn set_stock(&self, stock: Option<HashMap<ItemId, f64>>) {
        *self.stock.write() = stock;
    }

    pub fn fail_business_queries(&self, promotions: bool, stock: bool) {
        self.fail_promotions.store(promotions, Ordering::SeqCst);
        self.fail_stock.store(stock, Ordering::SeqCst);
    }

    fn catalog_ids(&self) -> HashSet<ItemId> {
        self.data.read().item_features.iter().map(|r| r.item_id).collect()
    }
}

#[async_trait::async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn ratings(&self) -> EngineResult<Vec<RatingRow>> {
        Ok(self.data.read().ratings.clone())
    }

    async fn orders(&self) -> EngineResult<Vec<OrderRow>> {
        Ok(self.data.read().orders.clone())
    }

    async fn item_features(&self) -> EngineResult<Vec<ItemFeatureRow>> {
        Ok(self.data.read().item_features.clone())
    }

    async fn preferences(&self) -> EngineResult<Vec<PreferenceRow>> {
        Ok(self.data.read().preferences.clone())
    }

    async fn save_preferences(&self, user_id: UserId, rows: Vec<PreferenceRow>) -> EngineResult<()> {
        let mut data = self.data.write();
        data.preferences.retain(|p| p.user_id != user_id);
        data.preferences.extend(rows);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BusinessDataSource for InMemoryFeatureStore {
    async fn active_promotions(&self, _now: DateTime<Utc>) -> EngineResult<HashSet<ItemId>> {
        if self.fail_promotions.load(Ordering::SeqCst) {
            return Err(EngineError::FilterQuery("promotion source unavailable".to_string()));
        }
        Ok(self.promotions.read().clone())
    }

    async fn stock_levels(&self) -> EngineResult<HashMap<ItemId, f64>> {
        if self.fail_stock.load(Ordering::SeqCst) {
            return Err(EngineError::FilterQuery("stock source unavailable".to_string()));
        }
        let configured = self.stock.read().clone();
        Ok(configured.unwrap_or_else(|| {
            self.catalog_ids()
                .into_iter()
                .map(|id| (id, UNLIMITED_STOCK))
                .collect()
        }))
    }
}
