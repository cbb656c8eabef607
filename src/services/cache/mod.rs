use crate::error::EngineResult;
use crate::models::{RecommendationResponse, UserId};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::debug;

/// Where generated recommendation lists are kept between requests.
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn save(&self, response: &RecommendationResponse) -> EngineResult<()>;
    async fn load(&self, user_id: UserId) -> EngineResult<Option<RecommendationResponse>>;
    async fn invalidate(&self, user_id: UserId) -> EngineResult<()>;
}

fn cache_key(user_id: UserId) -> String {
    format!("recommendations:{}", user_id)
}

pub struct RedisRecommendationStore {
    client: Arc<redis::Client>,
    ttl_seconds: u64,
}

impl RedisRecommendationStore {
    pub fn new(client: Arc<redis::Client>, ttl_seconds: u64) -> Self {
        Self { client, ttl_seconds }
    }
}

#[async_trait::async_trait]
impl RecommendationStore for RedisRecommendationStore {
    async fn save(&self, response: &RecommendationResponse) -> EngineResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let payload = serde_json::to_string(response)?;
        let _: () = conn
            .set_ex(cache_key(response.user_id), payload, self.ttl_seconds)
            .await?;
        debug!(
            "Stored {} recommendations for user {}",
            response.recommendations.len(),
            response.user_id
        );
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> EngineResult<Option<RecommendationResponse>> {
        let mut conn = self.client.get_async_connection().await?;
        let cached: Option<String> = conn.get(cache_key(user_id)).await?;
        match cached {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, user_id: UserId) -> EngineResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.del(cache_key(user_id)).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationStore {
    entries: DashMap<UserId, RecommendationResponse>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn save(&self, response: &RecommendationResponse) -> EngineResult<()> {
        self.entries.insert(response.user_id, response.clone());
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> EngineResult<Option<RecommendationResponse>> {
        Ok(self.entries.get(&user_id).map(|entry| entry.clone()))
    }

    async fn invalidate(&self, user_id: UserId) -> EngineResult<()> {
        self.entries.remove(&user_id);
        Ok(())
    }
}
