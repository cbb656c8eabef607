use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::services::feature_store::FeatureStore;
use crate::services::snapshot::{ModelSnapshot, SnapshotStore, SnapshotSummary};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// This call ran the rebuild and published `version`.
    Rebuilt { version: u64 },
    /// A rebuild that started after this call was made already covered it.
    Coalesced { version: u64 },
}

impl RefreshOutcome {
    pub fn version(&self) -> u64 {
        match self {
            RefreshOutcome::Rebuilt { version } | RefreshOutcome::Coalesced { version } => *version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub snapshot: SnapshotSummary,
    pub refreshes_requested: u64,
    pub rebuilds_completed: u64,
    pub rebuilds_failed: u64,
}

/// Rebuilds and publishes model snapshots. At most one rebuild runs at a
/// time; callers queued behind a rebuild that started after their request
/// share its result instead of triggering another.
pub struct TrainingService {
    feature_store: Arc<dyn FeatureStore>,
    snapshots: Arc<SnapshotStore>,
    config: Arc<Config>,
    rebuild_lock: Mutex<()>,
    requested: AtomicU64,
    covered: AtomicU64,
    rebuilds: AtomicU64,
    failures: AtomicU64,
}

impl TrainingService {
    pub fn new(feature_store: Arc<dyn FeatureStore>, snapshots: Arc<SnapshotStore>, config: Arc<Config>) -> Self {
        Self {
            feature_store,
            snapshots,
            config,
            rebuild_lock: Mutex::new(()),
            requested: AtomicU64::new(0),
            covered: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub async fn refresh_models(&self) -> EngineResult<RefreshOutcome> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.rebuild_lock.lock().await;

        if self.covered.load(Ordering::SeqCst) >= ticket {
            let version = self.snapshots.current().version;
            info!("Refresh request {} satisfied by rebuild of version {}", ticket, version);
            return Ok(RefreshOutcome::Coalesced { version });
        }

        // every request registered before extraction starts sees its data
        let covers = self.requested.load(Ordering::SeqCst);
        let timeout_secs = self.config.training.rebuild_timeout_secs;

        let result = match tokio::time::timeout(Duration::from_secs(timeout_secs), self.rebuild()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout_secs)),
        };

        match result {
            Ok(version) => {
                self.covered.fetch_max(covers, Ordering::SeqCst);
                self.rebuilds.fetch_add(1, Ordering::SeqCst);
                Ok(RefreshOutcome::Rebuilt { version })
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                match &e {
                    EngineError::DataUnavailable(reason) => {
                        warn!("Keeping previous model snapshot, data unavailable: {}", reason)
                    }
                    other => error!("Model rebuild failed: {}", other),
                }
                Err(e)
            }
        }
    }

    async fn rebuild(&self) -> EngineResult<u64> {
        let started = Instant::now();
        info!("Starting model rebuild");

        let data = self.feature_store.load_all().await?;
        let previous = self.snapshots.current();
        let config = self.config.clone();

        let snapshot = tokio::task::spawn_blocking(move || ModelSnapshot::build(data, &config, &previous))
            .await
            .map_err(|e| EngineError::ModelTraining(format!("training task failed: {}", e)))??;

        let version = self.snapshots.publish(snapshot);
        info!("Model rebuild finished in {:?}", started.elapsed());
        Ok(version)
    }

    pub fn status(&self) -> TrainingStatus {
        TrainingStatus {
            snapshot: self.snapshots.current().summary(),
            refreshes_requested: self.requested.load(Ordering::SeqCst),
            rebuilds_completed: self.rebuilds.load(Ordering::SeqCst),
            rebuilds_failed: self.failures.load(Ordering::SeqCst),
        }
    }

    /// Periodic retraining on a fixed interval. The first rebuild is left to
    /// the caller.
    pub fn start_retrain_worker(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.training.retrain_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            info!("Retrain worker started, interval {:?}", period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh_models().await {
                    warn!("Scheduled retrain did not publish a snapshot: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemFeatureRow, OrderRow, PreferenceRow, RatingRow, UserId};
    use crate::services::feature_store::{FeatureData, InMemoryFeatureStore};
    use std::sync::atomic::AtomicBool;

    /// Rating extraction stalls while `stalled` is set.
    struct StallingStore {
        inner: InMemoryFeatureStore,
        stalled: AtomicBool,
    }

    #[async_trait::async_trait]
    impl FeatureStore for StallingStore {
        async fn ratings(&self) -> EngineResult<Vec<RatingRow>> {
            if self.stalled.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            self.inner.ratings().await
        }

        async fn orders(&self) -> EngineResult<Vec<OrderRow>> {
            self.inner.orders().await
        }

        async fn item_features(&self) -> EngineResult<Vec<ItemFeatureRow>> {
            self.inner.item_features().await
        }

        async fn preferences(&self) -> EngineResult<Vec<PreferenceRow>> {
            self.inner.preferences().await
        }

        async fn save_preferences(&self, user_id: UserId, rows: Vec<PreferenceRow>) -> EngineResult<()> {
            self.inner.save_preferences(user_id, rows).await
        }
    }

    fn data() -> FeatureData {
        let item = |item_id, category: &str| ItemFeatureRow {
            item_id,
            name: format!("Dish {}", item_id),
            category_id: Some(1),
            category: Some(category.to_string()),
            ingredient: Some("rice".to_string()),
            ..Default::default()
        };
        FeatureData {
            ratings: vec![
                RatingRow { user_id: 1, item_id: 10, rating: 5.0 },
                RatingRow { user_id: 2, item_id: 20, rating: 4.0 },
                RatingRow { user_id: 2, item_id: 10, rating: 2.0 },
            ],
            item_features: vec![item(10, "Curry"), item(20, "Curry"), item(30, "Soup"), item(40, "Soup")],
            ..Default::default()
        }
    }

    fn service(store: Arc<InMemoryFeatureStore>) -> Arc<TrainingService> {
        Arc::new(TrainingService::new(
            store,
            Arc::new(SnapshotStore::new()),
            Arc::new(Config::default()),
        ))
    }

    #[tokio::test]
    async fn test_refresh_publishes_new_version() {
        let training = service(Arc::new(InMemoryFeatureStore::new(data())));
        let outcome = training.refresh_models().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Rebuilt { version: 1 });
        assert!(training.snapshots().current().is_trained());
        assert_eq!(training.status().rebuilds_completed, 1);
    }

    #[tokio::test]
    async fn test_data_unavailable_keeps_previous_snapshot() {
        let store = Arc::new(InMemoryFeatureStore::new(data()));
        let training = service(store.clone());
        training.refresh_models().await.unwrap();

        store.replace_data(FeatureData::default());
        let result = training.refresh_models().await;
        assert!(matches!(result, Err(EngineError::DataUnavailable(_))));
        assert_eq!(training.snapshots().current().version, 1);
        assert_eq!(training.status().rebuilds_failed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_coalesced() {
        let training = service(Arc::new(InMemoryFeatureStore::new(data())));

        let calls = (0..5).map(|_| training.refresh_models());
        let outcomes = futures::future::join_all(calls).await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        let rebuilds = training.status().rebuilds_completed;
        assert!(rebuilds >= 1 && rebuilds < 5, "rebuilds = {}", rebuilds);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Ok(RefreshOutcome::Coalesced { .. }))));
    }

    #[tokio::test]
    async fn test_timed_out_rebuild_publishes_nothing() {
        let store = Arc::new(StallingStore {
            inner: InMemoryFeatureStore::new(data()),
            stalled: AtomicBool::new(true),
        });
        let mut config = Config::default();
        config.training.rebuild_timeout_secs = 1;
        let training = TrainingService::new(store.clone(), Arc::new(SnapshotStore::new()), Arc::new(config));

        let result = training.refresh_models().await;
        assert!(matches!(result, Err(EngineError::Timeout(1))));
        assert_eq!(training.snapshots().current().version, 0);
        assert_eq!(training.status().rebuilds_failed, 1);
        assert_eq!(training.status().rebuilds_completed, 0);

        // the failed rebuild covered nobody, so the next request rebuilds
        store.stalled.store(false, Ordering::SeqCst);
        let outcome = training.refresh_models().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Rebuilt { version: 1 });
    }
}
