use crate::algorithms::{build_documents, ContentDocument, ContentModel, InteractionMatrix, LatentFactors};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::{CategoryId, ItemId, PreferenceRow, UserId};
use crate::services::feature_store::FeatureData;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Stored preference rows grouped by user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceIndex {
    by_user: HashMap<UserId, Vec<PreferenceRow>>,
}

impl PreferenceIndex {
    pub fn from_rows(rows: Vec<PreferenceRow>) -> Self {
        let mut by_user: HashMap<UserId, Vec<PreferenceRow>> = HashMap::new();
        for row in rows {
            by_user.entry(row.user_id).or_default().push(row);
        }
        Self { by_user }
    }

    pub fn rows(&self, user_id: UserId) -> &[PreferenceRow] {
        self.by_user.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        !self.rows(user_id).is_empty()
    }

    pub fn dietary_restrictions(&self, user_id: UserId) -> HashSet<CategoryId> {
        self.rows(user_id)
            .iter()
            .filter_map(|row| row.dietary_restriction)
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}

/// Immutable result of one rebuild. Readers hold an `Arc` to it for the
/// duration of a ranking pass.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub interactions: InteractionMatrix,
    pub factors: Option<Arc<LatentFactors>>,
    pub content: Option<Arc<ContentModel>>,
    documents: Vec<ContentDocument>,
    document_index: HashMap<ItemId, usize>,
    pub preferences: PreferenceIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub trained: bool,
    pub users: usize,
    pub items: usize,
    pub catalog_size: usize,
    pub latent_factors: Option<usize>,
    pub vocabulary_size: Option<usize>,
    pub users_with_preferences: usize,
}

impl ModelSnapshot {
    pub fn untrained() -> Self {
        Self {
            version: 0,
            built_at: Utc::now(),
            interactions: InteractionMatrix::empty(),
            factors: None,
            content: None,
            documents: Vec::new(),
            document_index: HashMap::new(),
            preferences: PreferenceIndex::default(),
        }
    }

    /// Builds the next snapshot from freshly extracted data.
    ///
    /// An empty matrix or catalog is `DataUnavailable`. A CF or CBF training
    /// failure keeps the corresponding section of `previous`.
    pub fn build(data: FeatureData, config: &Config, previous: &ModelSnapshot) -> EngineResult<Self> {
        let interactions = InteractionMatrix::build(
            &data.ratings,
            &data.orders,
            config.training.vote_aggregation,
        );
        if interactions.is_empty() {
            return Err(EngineError::DataUnavailable("no ratings or completed orders".to_string()));
        }

        let documents = build_documents(&data.item_features);
        if documents.is_empty() {
            return Err(EngineError::DataUnavailable("item catalog is empty".to_string()));
        }

        let (rows, cols) = interactions.shape();
        info!("Built interaction matrix with {} users and {} items", rows, cols);

        let factors = match LatentFactors::train(
            &interactions,
            config.training.latent_factors,
            config.training.random_seed,
        ) {
            Ok(factors) => Some(Arc::new(factors)),
            Err(e) => {
                warn!("Keeping previous collaborative filtering model: {}", e);
                previous.factors.clone()
            }
        };

        let content = match ContentModel::train(&documents, &config.content) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                warn!("Keeping previous content-based model: {}", e);
                previous.content.clone()
            }
        };

        let document_index = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (doc.item_id, i))
            .collect();

        Ok(Self {
            version: previous.version + 1,
            built_at: Utc::now(),
            interactions,
            factors,
            content,
            documents,
            document_index,
            preferences: PreferenceIndex::from_rows(data.preferences),
        })
    }

    pub fn is_trained(&self) -> bool {
        self.version > 0
    }

    pub fn documents(&self) -> &[ContentDocument] {
        &self.documents
    }

    pub fn document(&self, item_id: ItemId) -> Option<&ContentDocument> {
        self.document_index.get(&item_id).map(|&i| &self.documents[i])
    }

    pub fn summary(&self) -> SnapshotSummary {
        let (users, items) = self.interactions.shape();
        SnapshotSummary {
            version: self.version,
            built_at: self.built_at,
            trained: self.is_trained(),
            users,
            items,
            catalog_size: self.documents.len(),
            latent_factors: self.factors.as_ref().map(|f| f.rank()),
            vocabulary_size: self.content.as_ref().map(|c| c.vectorizer().vocabulary_size()),
            users_with_preferences: self.preferences.user_count(),
        }
    }
}

/// Single published snapshot slot, swapped whole on every rebuild.
pub struct SnapshotStore {
    slot: RwLock<Arc<ModelSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Arc::new(ModelSnapshot::untrained())),
        }
    }

    pub fn current(&self) -> Arc<ModelSnapshot> {
        self.slot.read().clone()
    }

    pub fn publish(&self, snapshot: ModelSnapshot) -> u64 {
        let version = snapshot.version;
        *self.slot.write() = Arc::new(snapshot);
        info!("Published model snapshot version {}", version);
        version
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
