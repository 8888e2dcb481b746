//! Per-model token pricing with a time-gated external refresh.
//!
//! The table is seeded with a built-in price list on first use and refreshed
//! as a batch through a pluggable [`PriceFeed`] once the staleness interval
//! has elapsed since the last successful refresh. Feed failures are reported
//! and retried on the next call; they do not advance the staleness clock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::store::{BlobStore, StorageError, StorageResult};

/// Snapshot key for the pricing table.
pub const PRICES_KEY: &str = "llmPrices";

/// How long a successful refresh stays fresh.
pub fn staleness_interval() -> Duration {
    Duration::hours(24)
}

// ============================================================================
// PricingEntry
// ============================================================================

/// Unit prices for one model, in currency units per 1k tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingEntry {
    pub model: String,
    pub input_price: f64,
    pub output_price: f64,
    pub last_updated: DateTime<Utc>,
}

impl PricingEntry {
    fn new(model: &str, input_price: f64, output_price: f64, now: DateTime<Utc>) -> Self {
        Self {
            model: model.to_string(),
            input_price,
            output_price,
            last_updated: now,
        }
    }
}

fn default_prices(now: DateTime<Utc>) -> Vec<PricingEntry> {
    vec![
        PricingEntry::new("gpt-4", 0.03, 0.06, now),
        PricingEntry::new("gpt-4-32k", 0.06, 0.12, now),
        PricingEntry::new("gpt-3.5-turbo", 0.0015, 0.002, now),
        PricingEntry::new("gpt-3.5-turbo-16k", 0.003, 0.004, now),
        PricingEntry::new("claude-2", 0.008, 0.024, now),
        PricingEntry::new("claude-instant-1", 0.0008, 0.0024, now),
    ]
}

// ============================================================================
// PriceFeed
// ============================================================================

/// External source of current model prices.
///
/// No public pricing API exists for the major providers, so the crate ships
/// only the trait; embedding applications supply a feed (scraper, third-party
/// API, manual list).
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_prices(&self) -> anyhow::Result<Vec<PricingEntry>>;
}

// ============================================================================
// PricingTable
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingSnapshot {
    prices: HashMap<String, PricingEntry>,
    /// Timestamp of the last successful refresh. `None` until the first
    /// refresh succeeds, which makes a fresh table immediately eligible.
    #[serde(default)]
    last_refresh: Option<DateTime<Utc>>,
}

/// Lookup of per-model unit prices, mirrored to a [`BlobStore`] snapshot.
pub struct PricingTable {
    store: Arc<dyn BlobStore>,
    snapshot: RwLock<PricingSnapshot>,
}

impl PricingTable {
    /// Load the persisted table, seeding and persisting the built-in price
    /// list when none exists.
    pub async fn load(store: Arc<dyn BlobStore>) -> StorageResult<Self> {
        let snapshot = match store.read_blob(PRICES_KEY).await? {
            Some(data) => {
                serde_json::from_str(&data).map_err(|e| StorageError::snapshot(PRICES_KEY, e))?
            }
            None => {
                let now = Utc::now();
                let snapshot = PricingSnapshot {
                    prices: default_prices(now)
                        .into_iter()
                        .map(|e| (e.model.clone(), e))
                        .collect(),
                    last_refresh: None,
                };
                let data = serde_json::to_string(&snapshot)
                    .map_err(|e| StorageError::snapshot(PRICES_KEY, e))?;
                store.write_blob(PRICES_KEY, &data).await?;
                info!(models = snapshot.prices.len(), "seeded default price table");
                snapshot
            }
        };
        Ok(Self {
            store,
            snapshot: RwLock::new(snapshot),
        })
    }

    pub async fn get_pricing(&self, model: &str) -> Option<PricingEntry> {
        self.snapshot.read().await.prices.get(model).cloned()
    }

    /// Owned copy of the table; mutations do not reach the table itself.
    pub async fn get_all_prices(&self) -> HashMap<String, PricingEntry> {
        self.snapshot.read().await.prices.clone()
    }

    /// Timestamp of the last successful refresh, if any.
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.last_refresh
    }

    /// Cost of a request in currency units. Unknown models cost `0`.
    pub async fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.snapshot.read().await.prices.get(model) {
            Some(entry) => {
                (input_tokens as f64 / 1000.0) * entry.input_price
                    + (output_tokens as f64 / 1000.0) * entry.output_price
            }
            None => 0.0,
        }
    }

    /// Refresh the table through `feed` when the staleness interval has
    /// elapsed since the last successful refresh.
    ///
    /// Returns `Ok(true)` when a refresh was applied. Feed failures are
    /// logged and swallowed (`Ok(false)`); the staleness clock keeps running
    /// from the original timestamp so the next call retries immediately.
    pub async fn refresh_if_stale(&self, feed: &dyn PriceFeed) -> StorageResult<bool> {
        let now = Utc::now();
        {
            let snapshot = self.snapshot.read().await;
            if let Some(last) = snapshot.last_refresh {
                if now - last < staleness_interval() {
                    return Ok(false);
                }
            }
        }

        let entries = match feed.fetch_prices().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "price feed refresh failed; keeping current table");
                return Ok(false);
            }
        };

        let mut snapshot = self.snapshot.write().await;
        for mut entry in entries {
            entry.last_updated = now;
            snapshot.prices.insert(entry.model.clone(), entry);
        }
        snapshot.last_refresh = Some(now);

        let data = serde_json::to_string(&*snapshot)
            .map_err(|e| StorageError::snapshot(PRICES_KEY, e))?;
        if let Err(e) = self.store.write_blob(PRICES_KEY, &data).await {
            // In-memory table keeps the refreshed values for the session.
            error!(error = %e, "failed to persist refreshed price table");
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::MemoryBlobStore;

    struct StubFeed {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubFeed {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceFeed for StubFeed {
        async fn fetch_prices(&self) -> anyhow::Result<Vec<PricingEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("feed unreachable");
            }
            Ok(vec![PricingEntry::new("gpt-4", 0.01, 0.02, Utc::now())])
        }
    }

    async fn fresh_table() -> PricingTable {
        PricingTable::load(Arc::new(MemoryBlobStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn seeds_default_table_and_persists_it() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let table = PricingTable::load(blobs.clone()).await.unwrap();

        let entry = table.get_pricing("gpt-4").await.unwrap();
        assert_eq!(entry.input_price, 0.03);
        assert_eq!(entry.output_price, 0.06);

        // The seed is written immediately, so a reload sees the same table.
        let reloaded = PricingTable::load(blobs).await.unwrap();
        assert_eq!(reloaded.get_all_prices().await.len(), 6);
        assert!(reloaded.last_refresh().await.is_none());
    }

    #[tokio::test]
    async fn calculate_cost_matches_per_1k_rates() {
        let table = fresh_table().await;

        assert_eq!(table.calculate_cost("gpt-4", 0, 0).await, 0.0);
        let cost = table.calculate_cost("gpt-4", 1000, 500).await;
        assert!((cost - 0.06).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_model_costs_zero() {
        let table = fresh_table().await;

        assert_eq!(table.calculate_cost("mystery-model", 0, 0).await, 0.0);
        assert_eq!(table.calculate_cost("mystery-model", 100_000, 50_000).await, 0.0);
        assert!(table.get_pricing("mystery-model").await.is_none());
    }

    #[tokio::test]
    async fn get_all_prices_is_a_defensive_copy() {
        let table = fresh_table().await;

        let mut copy = table.get_all_prices().await;
        copy.remove("gpt-4");
        copy.insert(
            "injected".to_string(),
            PricingEntry::new("injected", 1.0, 1.0, Utc::now()),
        );

        assert!(table.get_pricing("gpt-4").await.is_some());
        assert!(table.get_pricing("injected").await.is_none());
    }

    #[tokio::test]
    async fn refresh_applies_feed_prices_and_stamps_timestamp() {
        let table = fresh_table().await;
        let feed = StubFeed::new(false);

        assert!(table.refresh_if_stale(&feed).await.unwrap());
        assert_eq!(feed.calls(), 1);
        let entry = table.get_pricing("gpt-4").await.unwrap();
        assert_eq!(entry.input_price, 0.01);
        assert!(table.last_refresh().await.is_some());

        // Models the feed did not mention keep their prices.
        assert!(table.get_pricing("claude-2").await.is_some());
    }

    #[tokio::test]
    async fn refresh_is_gated_by_staleness_interval() {
        let table = fresh_table().await;
        let feed = StubFeed::new(false);

        assert!(table.refresh_if_stale(&feed).await.unwrap());
        assert!(!table.refresh_if_stale(&feed).await.unwrap());
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_does_not_advance_the_clock() {
        let table = fresh_table().await;
        let feed = StubFeed::new(true);

        assert!(!table.refresh_if_stale(&feed).await.unwrap());
        assert!(table.last_refresh().await.is_none());
        // Still eligible: the failure did not reset the staleness clock.
        assert!(!table.refresh_if_stale(&feed).await.unwrap());
        assert_eq!(feed.calls(), 2);

        // Table contents untouched by the failed attempts.
        let entry = table.get_pricing("gpt-4").await.unwrap();
        assert_eq!(entry.input_price, 0.03);
    }

    #[tokio::test]
    async fn stale_persisted_timestamp_triggers_refresh_after_reload() {
        let blobs = Arc::new(MemoryBlobStore::new());
        {
            let table = PricingTable::load(blobs.clone()).await.unwrap();
            table.refresh_if_stale(&StubFeed::new(false)).await.unwrap();
        }

        // Age the persisted snapshot past the staleness interval.
        let data = blobs.read_blob(PRICES_KEY).await.unwrap().unwrap();
        let mut snapshot: serde_json::Value = serde_json::from_str(&data).unwrap();
        let aged = Utc::now() - Duration::hours(25);
        snapshot["lastRefresh"] = serde_json::json!(aged);
        blobs
            .write_blob(PRICES_KEY, &snapshot.to_string())
            .await
            .unwrap();

        let table = PricingTable::load(blobs).await.unwrap();
        let feed = StubFeed::new(false);
        assert!(table.refresh_if_stale(&feed).await.unwrap());
        assert_eq!(feed.calls(), 1);
    }
}
