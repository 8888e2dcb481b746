//! Provider configuration records and their durable store.
//!
//! Configurations are held in an in-memory map and mirrored to a [`BlobStore`]
//! snapshot on every mutation. The snapshot is written before the in-memory
//! map is committed, so a failed write leaves callers observing the prior
//! state.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::error;

use crate::store::{BlobStore, StorageError, StorageResult};

/// Snapshot key for the configuration list.
pub const CONFIGS_KEY: &str = "llmConfigs";
/// Snapshot key for the selected-configuration id set.
pub const SELECTED_KEY: &str = "selectedLLMs";

// ============================================================================
// ProviderConfig
// ============================================================================

/// A named, credentialed binding to one provider/model combination.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Opaque unique id, assigned at creation, immutable thereafter.
    pub id: String,
    /// Display label. Non-empty, no uniqueness constraint.
    pub name: String,
    /// Bearer credential for the provider. Never logged.
    pub api_key: String,
    /// Provider-specific model identifier.
    pub model: String,
    /// Full completions URL override. When absent, the default
    /// OpenAI-compatible endpoint is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling randomness, in `[0, 2]`.
    pub temperature: f32,
    /// Flat fallback rate, used only when the pricing table has no entry for
    /// `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
}

impl ProviderConfig {
    /// Create a config with a freshly assigned id and default limits.
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: name.into(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            max_tokens: 1024,
            temperature: 1.0,
            cost_per_1k_tokens: None,
        }
    }

    pub(crate) fn validate(&self) -> StorageResult<()> {
        if self.id.trim().is_empty() {
            return Err(StorageError::InvalidRecord("id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidRecord("name must not be empty".into()));
        }
        if self.api_key.is_empty() {
            return Err(StorageError::InvalidRecord("apiKey must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(StorageError::InvalidRecord("model must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(StorageError::InvalidRecord("maxTokens must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(StorageError::InvalidRecord(
                "temperature must be within [0, 2]".into(),
            ));
        }
        if self.cost_per_1k_tokens.is_some_and(|c| c < 0.0) {
            return Err(StorageError::InvalidRecord(
                "costPer1kTokens must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .finish()
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Durable mapping from configuration id to [`ProviderConfig`].
pub struct ConfigStore {
    store: Arc<dyn BlobStore>,
    configs: RwLock<HashMap<String, ProviderConfig>>,
}

impl ConfigStore {
    /// Load the persisted snapshot, or start empty when none exists.
    pub async fn load(store: Arc<dyn BlobStore>) -> StorageResult<Self> {
        let configs = match store.read_blob(CONFIGS_KEY).await? {
            Some(data) => {
                let records: Vec<ProviderConfig> = serde_json::from_str(&data)
                    .map_err(|e| StorageError::snapshot(CONFIGS_KEY, e))?;
                records.into_iter().map(|c| (c.id.clone(), c)).collect()
            }
            None => HashMap::new(),
        };
        Ok(Self {
            store,
            configs: RwLock::new(configs),
        })
    }

    /// All configs, in unspecified order. Never fails.
    pub async fn get_all(&self) -> Vec<ProviderConfig> {
        self.configs.read().await.values().cloned().collect()
    }

    /// Lookup by id. Absence is not an error.
    pub async fn get(&self, id: &str) -> Option<ProviderConfig> {
        self.configs.read().await.get(id).cloned()
    }

    /// Insert or replace the record with `config.id`, rewriting the persisted
    /// snapshot. On a failed write the in-memory map is left unchanged.
    pub async fn upsert(&self, config: ProviderConfig) -> StorageResult<()> {
        config.validate()?;

        let mut configs = self.configs.write().await;
        let mut next = configs.clone();
        next.insert(config.id.clone(), config);

        self.persist(&next).await?;
        *configs = next;
        Ok(())
    }

    /// Remove the record if present. Deleting an absent id is a no-op.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let mut configs = self.configs.write().await;
        if !configs.contains_key(id) {
            return Ok(());
        }
        let mut next = configs.clone();
        next.remove(id);

        self.persist(&next).await?;
        *configs = next;
        Ok(())
    }

    async fn persist(&self, configs: &HashMap<String, ProviderConfig>) -> StorageResult<()> {
        // Sorted by id so the snapshot is deterministic.
        let mut records: Vec<&ProviderConfig> = configs.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let data = serde_json::to_string(&records)
            .map_err(|e| StorageError::snapshot(CONFIGS_KEY, e))?;
        if let Err(e) = self.store.write_blob(CONFIGS_KEY, &data).await {
            error!(error = %e, "failed to persist provider config snapshot");
            return Err(e);
        }
        Ok(())
    }
}

// ============================================================================
// SelectionStore
// ============================================================================

/// Persisted set of currently-selected configuration ids.
///
/// Independent of [`ConfigStore`]: deleting a config does not implicitly
/// deselect it, that is the caller's choice.
pub struct SelectionStore {
    store: Arc<dyn BlobStore>,
    selected: RwLock<BTreeSet<String>>,
}

impl SelectionStore {
    pub async fn load(store: Arc<dyn BlobStore>) -> StorageResult<Self> {
        let selected = match store.read_blob(SELECTED_KEY).await? {
            Some(data) => {
                let ids: Vec<String> = serde_json::from_str(&data)
                    .map_err(|e| StorageError::snapshot(SELECTED_KEY, e))?;
                ids.into_iter().collect()
            }
            None => BTreeSet::new(),
        };
        Ok(Self {
            store,
            selected: RwLock::new(selected),
        })
    }

    pub async fn selected(&self) -> Vec<String> {
        self.selected.read().await.iter().cloned().collect()
    }

    pub async fn is_selected(&self, id: &str) -> bool {
        self.selected.read().await.contains(id)
    }

    /// Flip the selection state of `id`, returning the new state.
    pub async fn toggle(&self, id: &str) -> StorageResult<bool> {
        let mut selected = self.selected.write().await;
        let mut next = selected.clone();
        let now_selected = if next.contains(id) {
            next.remove(id);
            false
        } else {
            next.insert(id.to_string());
            true
        };

        let ids: Vec<&String> = next.iter().collect();
        let data =
            serde_json::to_string(&ids).map_err(|e| StorageError::snapshot(SELECTED_KEY, e))?;
        if let Err(e) = self.store.write_blob(SELECTED_KEY, &data).await {
            error!(error = %e, "failed to persist selection snapshot");
            return Err(e);
        }
        *selected = next;
        Ok(now_selected)
    }
}
