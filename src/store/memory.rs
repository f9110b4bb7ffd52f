use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::store::{CommitOutcome, PriceStore, ProductCommit};
use crate::types::{
    MarketAnalysis, ObservedPrice, PriceAlert, PriceChange, PriceHistoryEntry, PriceRanking,
    PriceSnapshot, PriceSource, PricingStrategy, Product, ProductId, ProductSourceMapping,
    SourceId, SourceStatus,
};

// ---------------------------------------------------------------------------
// ProductEntry: everything the engine owns for one product lives in one map entry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ProductEntry {
    product: Product,
    analysis: Option<MarketAnalysis>,
    ranking: Option<PriceRanking>,
    history: Vec<PriceHistoryEntry>,
}

impl ProductEntry {
    fn new(product: Product) -> Self {
        Self { product, analysis: None, ranking: None, history: Vec::new() }
    }

    /// Compare-and-set on our price. Caller holds the entry lock.
    fn apply_price_change(&mut self, change: &PriceChange, at: DateTime<Utc>) -> bool {
        if self.product.our_price != change.expected {
            return false;
        }
        self.history.push(PriceHistoryEntry {
            product_id: self.product.id,
            old_price: self.product.our_price,
            new_price: change.new_price,
            reason: change.reason,
            created_at: at,
        });
        self.product.our_price = change.new_price;
        true
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// DashMap-backed price store. A product's commit is applied while holding that
/// product's entry, so analysis, ranking and price never appear half-written.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// product_id → catalog row plus engine-owned state
    products: DashMap<ProductId, ProductEntry>,
    /// product_id → observations in arrival order
    observed: DashMap<ProductId, Vec<ObservedPrice>>,
    /// product_id → snapshots in arrival order
    snapshots: DashMap<ProductId, Vec<PriceSnapshot>>,
    sources: DashMap<SourceId, PriceSource>,
    /// mapping id → mapping
    mappings: DashMap<i64, ProductSourceMapping>,
    strategies: DashMap<i64, PricingStrategy>,
    alerts: DashMap<i64, PriceAlert>,
    next_alert_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id, ProductEntry::new(product));
    }

    pub fn record_observed_price(&self, observed: ObservedPrice) {
        self.observed.entry(observed.product_id).or_default().push(observed);
    }

    pub fn insert_source(&self, source: PriceSource) {
        self.sources.insert(source.id, source);
    }

    pub fn insert_mapping(&self, mapping: ProductSourceMapping) {
        self.mappings.insert(mapping.id, mapping);
    }

    pub fn insert_strategy(&self, strategy: PricingStrategy) {
        self.strategies.insert(strategy.id, strategy);
    }

    fn push_alert(&self, alert: &PriceAlert) -> i64 {
        let id = self.next_alert_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut stored = alert.clone();
        stored.id = Some(id);
        self.alerts.insert(id, stored);
        id
    }

    fn latest_per_source(&self, product_id: ProductId) -> Vec<ObservedPrice> {
        let Some(rows) = self.observed.get(&product_id) else {
            return Vec::new();
        };
        let mut latest: HashMap<SourceId, &ObservedPrice> = HashMap::new();
        for row in rows.iter() {
            match latest.get(&row.source_id) {
                Some(seen) if seen.observed_at > row.observed_at => {}
                _ => {
                    latest.insert(row.source_id, row);
                }
            }
        }
        let mut out: Vec<ObservedPrice> = latest.into_values().cloned().collect();
        out.sort_by_key(|o| o.source_id);
        out
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.get(&product_id).map(|e| e.value().product.clone()))
    }

    async fn active_products(&self) -> Result<Vec<Product>> {
        let mut out: Vec<Product> = self
            .products
            .iter()
            .filter(|e| e.product.is_active)
            .map(|e| e.value().product.clone())
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn fetch_in_stock_prices(&self, product_id: ProductId) -> Result<Vec<(SourceId, f64)>> {
        Ok(self
            .latest_per_source(product_id)
            .into_iter()
            .filter(ObservedPrice::is_qualifying)
            .map(|o| (o.source_id, o.price))
            .collect())
    }

    async fn latest_observed_prices(&self, product_id: ProductId) -> Result<Vec<ObservedPrice>> {
        Ok(self.latest_per_source(product_id))
    }

    async fn fetch_snapshot_window(
        &self,
        product_id: ProductId,
        source_id: Option<SourceId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, DateTime<Utc>)>> {
        let Some(rows) = self.snapshots.get(&product_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<(f64, DateTime<Utc>)> = rows
            .iter()
            .filter(|s| source_id.map_or(true, |id| s.source_id == id))
            .filter(|s| s.snapshot_at >= from && s.snapshot_at <= to)
            .map(|s| (s.price, s.snapshot_at))
            .collect();
        out.sort_by_key(|(_, at)| *at);
        Ok(out)
    }

    async fn last_snapshot_per_source(
        &self,
        product_id: ProductId,
        before: DateTime<Utc>,
    ) -> Result<HashMap<SourceId, PriceSnapshot>> {
        let mut out: HashMap<SourceId, PriceSnapshot> = HashMap::new();
        let Some(rows) = self.snapshots.get(&product_id) else {
            return Ok(out);
        };
        for snap in rows.iter().filter(|s| s.snapshot_at < before) {
            match out.get(&snap.source_id) {
                Some(seen) if seen.snapshot_at > snap.snapshot_at => {}
                _ => {
                    out.insert(snap.source_id, snap.clone());
                }
            }
        }
        Ok(out)
    }

    async fn source(&self, source_id: SourceId) -> Result<Option<PriceSource>> {
        Ok(self.sources.get(&source_id).map(|s| s.value().clone()))
    }

    async fn active_sources(&self) -> Result<Vec<PriceSource>> {
        let mut out: Vec<PriceSource> = self
            .sources
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.value().clone())
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    async fn source_mappings(&self, source_id: SourceId) -> Result<Vec<ProductSourceMapping>> {
        let mut out: Vec<ProductSourceMapping> = self
            .mappings
            .iter()
            .filter(|m| m.source_id == source_id && m.is_active)
            .map(|m| m.value().clone())
            .collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }

    async fn active_strategy(&self) -> Result<Option<PricingStrategy>> {
        Ok(self
            .strategies
            .iter()
            .filter(|s| s.is_active)
            .min_by_key(|s| s.id)
            .map(|s| s.value().clone()))
    }

    async fn analysis(&self, product_id: ProductId) -> Result<Option<MarketAnalysis>> {
        Ok(self.products.get(&product_id).and_then(|e| e.value().analysis.clone()))
    }

    async fn ranking(&self, product_id: ProductId) -> Result<Option<PriceRanking>> {
        Ok(self.products.get(&product_id).and_then(|e| e.value().ranking.clone()))
    }

    async fn list_alerts(&self, acknowledged: bool, limit: usize) -> Result<Vec<PriceAlert>> {
        let mut out: Vec<PriceAlert> = self
            .alerts
            .iter()
            .filter(|a| a.is_acknowledged == acknowledged)
            .map(|a| a.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        Ok(out)
    }

    async fn price_history(&self, product_id: ProductId) -> Result<Vec<PriceHistoryEntry>> {
        Ok(self
            .products
            .get(&product_id)
            .map(|e| e.value().history.clone())
            .unwrap_or_default())
    }

    async fn upsert_analysis(&self, analysis: &MarketAnalysis) -> Result<()> {
        let mut entry = self
            .products
            .get_mut(&analysis.product_id)
            .ok_or(AppError::ProductNotFound(analysis.product_id))?;
        entry.analysis = Some(analysis.clone());
        Ok(())
    }

    async fn upsert_ranking(&self, ranking: &PriceRanking) -> Result<()> {
        let mut entry = self
            .products
            .get_mut(&ranking.product_id)
            .ok_or(AppError::ProductNotFound(ranking.product_id))?;
        entry.ranking = Some(ranking.clone());
        Ok(())
    }

    async fn append_alert(&self, alert: &PriceAlert) -> Result<i64> {
        Ok(self.push_alert(alert))
    }

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        self.snapshots
            .entry(snapshot.product_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn set_product_price(
        &self,
        product_id: ProductId,
        change: &PriceChange,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut entry = self
            .products
            .get_mut(&product_id)
            .ok_or(AppError::ProductNotFound(product_id))?;
        Ok(entry.apply_price_change(change, at))
    }

    async fn update_competitor_stats(
        &self,
        product_id: ProductId,
        min: f64,
        max: f64,
        avg: f64,
    ) -> Result<()> {
        let mut entry = self
            .products
            .get_mut(&product_id)
            .ok_or(AppError::ProductNotFound(product_id))?;
        entry.product.min_price = Some(min);
        entry.product.max_price = Some(max);
        entry.product.avg_competitor_price = Some(avg);
        Ok(())
    }

    async fn update_source_status(
        &self,
        source_id: SourceId,
        status: SourceStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut source = self
            .sources
            .get_mut(&source_id)
            .ok_or(AppError::SourceNotFound(source_id))?;
        source.check_status = status;
        source.last_error = error.map(str::to_string);
        if status == SourceStatus::Running {
            source.last_checked = Some(at);
        }
        Ok(())
    }

    async fn acknowledge_alert(&self, alert_id: i64, at: DateTime<Utc>) -> Result<PriceAlert> {
        let mut alert = self
            .alerts
            .get_mut(&alert_id)
            .ok_or(AppError::AlertNotFound(alert_id))?;
        alert.is_acknowledged = true;
        alert.acknowledged_at = Some(at);
        Ok(alert.value().clone())
    }

    async fn commit_product(&self, commit: ProductCommit) -> Result<CommitOutcome> {
        let mut entry = self
            .products
            .get_mut(&commit.product_id)
            .ok_or(AppError::ProductNotFound(commit.product_id))?;

        if let Some(analysis) = commit.analysis {
            entry.product.min_price = Some(analysis.price_min);
            entry.product.max_price = Some(analysis.price_max);
            entry.product.avg_competitor_price = Some(analysis.price_avg);
            entry.analysis = Some(analysis);
        }
        if let Some(ranking) = commit.ranking {
            entry.ranking = Some(ranking);
        }
        let alert_ids = commit.alerts.iter().map(|a| self.push_alert(a)).collect();
        let price_updated = commit
            .price_change
            .as_ref()
            .map(|change| entry.apply_price_change(change, commit.committed_at))
            .unwrap_or(false);

        Ok(CommitOutcome { alert_ids, price_updated })
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let before = self.alerts.len();
        self.alerts.retain(|_, a| a.created_at >= cutoff);
        Ok((before - self.alerts.len()) as u64)
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut deleted = 0u64;
        for mut rows in self.snapshots.iter_mut() {
            let before = rows.len();
            rows.retain(|s| s.snapshot_at >= cutoff);
            deleted += (before - rows.len()) as u64;
        }
        Ok(deleted)
    }
}
