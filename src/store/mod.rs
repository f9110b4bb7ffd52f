pub mod memory;
pub mod models;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    MarketAnalysis, ObservedPrice, PriceAlert, PriceChange, PriceHistoryEntry, PriceRanking,
    PriceSnapshot, PriceSource, PricingStrategy, Product, ProductId, ProductSourceMapping,
    SourceId, SourceStatus,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Everything one product's monitoring pass writes, applied as a single commit.
#[derive(Debug, Clone)]
pub struct ProductCommit {
    pub product_id: ProductId,
    pub analysis: Option<MarketAnalysis>,
    pub ranking: Option<PriceRanking>,
    pub alerts: Vec<PriceAlert>,
    pub price_change: Option<PriceChange>,
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub alert_ids: Vec<i64>,
    /// False when no change was requested or the compare-and-set lost a race.
    pub price_updated: bool,
}

/// Read/write contract between the engine and the price store.
///
/// Replace-on-recompute rows (analysis, ranking) are upserts keyed by product id.
/// `append_*` calls are insert-only; everything else is idempotent on retry.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>>;

    async fn active_products(&self) -> Result<Vec<Product>>;

    /// Latest observation per source, kept only when in stock with a positive price.
    async fn fetch_in_stock_prices(&self, product_id: ProductId) -> Result<Vec<(SourceId, f64)>>;

    /// Latest observation per source regardless of stock, ordered by source id.
    async fn latest_observed_prices(&self, product_id: ProductId) -> Result<Vec<ObservedPrice>>;

    /// Snapshot prices within `[from, to]`, optionally narrowed to one source.
    async fn fetch_snapshot_window(
        &self,
        product_id: ProductId,
        source_id: Option<SourceId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, DateTime<Utc>)>>;

    async fn average_snapshot_price(
        &self,
        product_id: ProductId,
        source_id: Option<SourceId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let window = self.fetch_snapshot_window(product_id, source_id, from, to).await?;
        if window.is_empty() {
            return Ok(None);
        }
        let sum: f64 = window.iter().map(|(p, _)| p).sum();
        Ok(Some(sum / window.len() as f64))
    }

    /// Most recent snapshot strictly before `before`, per source.
    async fn last_snapshot_per_source(
        &self,
        product_id: ProductId,
        before: DateTime<Utc>,
    ) -> Result<HashMap<SourceId, PriceSnapshot>>;

    async fn source(&self, source_id: SourceId) -> Result<Option<PriceSource>>;

    async fn active_sources(&self) -> Result<Vec<PriceSource>>;

    /// Active mappings for a source.
    async fn source_mappings(&self, source_id: SourceId) -> Result<Vec<ProductSourceMapping>>;

    async fn active_strategy(&self) -> Result<Option<PricingStrategy>>;

    async fn analysis(&self, product_id: ProductId) -> Result<Option<MarketAnalysis>>;

    async fn ranking(&self, product_id: ProductId) -> Result<Option<PriceRanking>>;

    /// Newest first.
    async fn list_alerts(&self, acknowledged: bool, limit: usize) -> Result<Vec<PriceAlert>>;

    /// Oldest first.
    async fn price_history(&self, product_id: ProductId) -> Result<Vec<PriceHistoryEntry>>;

    async fn upsert_analysis(&self, analysis: &MarketAnalysis) -> Result<()>;

    async fn upsert_ranking(&self, ranking: &PriceRanking) -> Result<()>;

    /// Returns the assigned alert id.
    async fn append_alert(&self, alert: &PriceAlert) -> Result<i64>;

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()>;

    /// Compare-and-set on `our_price`; appends a history entry when applied.
    async fn set_product_price(
        &self,
        product_id: ProductId,
        change: &PriceChange,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn update_competitor_stats(
        &self,
        product_id: ProductId,
        min: f64,
        max: f64,
        avg: f64,
    ) -> Result<()>;

    /// `Running` also stamps `last_checked` with `at`.
    async fn update_source_status(
        &self,
        source_id: SourceId,
        status: SourceStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn acknowledge_alert(&self, alert_id: i64, at: DateTime<Utc>) -> Result<PriceAlert>;

    /// Applies analysis, ranking, alerts and price change for one product atomically.
    /// An analysis also refreshes the product's cached competitor min/max/avg.
    async fn commit_product(&self, commit: ProductCommit) -> Result<CommitOutcome>;

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
