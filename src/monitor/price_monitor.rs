use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::analyzer::MarketAnalyzer;
use crate::benchmark::{validate_against_benchmark, BenchmarkProvider};
use crate::config::{EngineConfig, MonitorThresholds};
use crate::error::Result;
use crate::pricing::ensure_not_below_cost;
use crate::ranker::PriceRanker;
use crate::stats::percent_change;
use crate::store::{PriceStore, ProductCommit};
use crate::types::{AlertKind, PriceAlert, PriceChange, PriceChangeReason, Product, ProductId, SourceId};

/// Aggregate counters for one full sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepStats {
    pub total_products: u32,
    pub products_analyzed: u32,
    pub prices_updated: u32,
    pub alerts_created: u32,
    pub failures: u32,
}

/// What the hysteresis rule made of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PriceDecision {
    Update { from: f64, to: f64 },
    /// Too close to the current price to be worth a change.
    Skipped { diff: f64, diff_pct: f64 },
    NoRecommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductReport {
    pub product_id: ProductId,
    pub analyzed: bool,
    /// False when our price strays too far from the benchmark.
    pub benchmark_ok: bool,
    pub alert_ids: Vec<i64>,
    pub decision: PriceDecision,
    /// False for skips and for a change that lost the compare-and-set.
    pub price_updated: bool,
}

/// Drives analysis, change alerts, ranking and auto-pricing over the catalog.
pub struct PriceMonitor {
    pub(crate) store: Arc<dyn PriceStore>,
    analyzer: MarketAnalyzer,
    ranker: PriceRanker,
    cfg: EngineConfig,
}

impl PriceMonitor {
    pub fn new(
        store: Arc<dyn PriceStore>,
        benchmark: Arc<dyn BenchmarkProvider>,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            analyzer: MarketAnalyzer::new(store.clone(), benchmark),
            ranker: PriceRanker::new(store.clone()),
            store,
            cfg,
        }
    }

    /// One pass over every active product. A product that fails is logged and counted
    /// and the sweep moves on; writes already committed for other products stay.
    pub async fn monitor_all_products(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let products = self.store.active_products().await?;
        let mut stats = SweepStats {
            total_products: products.len() as u32,
            ..Default::default()
        };
        info!("Starting price monitoring for {} products", products.len());

        for product in &products {
            match self.monitor_product(product, now).await {
                Ok(report) => {
                    stats.products_analyzed += u32::from(report.analyzed);
                    stats.alerts_created += report.alert_ids.len() as u32;
                    stats.prices_updated += u32::from(report.price_updated);
                }
                Err(e) => {
                    stats.failures += 1;
                    error!(product_id = product.id, "Error monitoring product {}: {e}", product.sku);
                }
            }
        }

        info!(
            total = stats.total_products,
            analyzed = stats.products_analyzed,
            updated = stats.prices_updated,
            alerts = stats.alerts_created,
            failures = stats.failures,
            "Price monitoring completed"
        );
        Ok(stats)
    }

    /// Analysis, change alerts, ranking and the price decision for one product,
    /// committed together.
    pub async fn monitor_product(&self, product: &Product, now: DateTime<Utc>) -> Result<ProductReport> {
        let analysis = self.analyzer.compute(product, now).await?.ready();
        let alerts = self.check_price_changes(product, now).await?;

        let ranking = match analysis {
            Some(_) => self.ranker.compute(product, &self.cfg.pricing, now).await?.ready(),
            None => None,
        };
        let decision = match &ranking {
            Some(r) => decide_price(product.our_price, r.recommended_price, &self.cfg.monitor),
            None => PriceDecision::NoRecommendation,
        };

        let price_change = match decision {
            PriceDecision::Update { from, to } => Some(PriceChange {
                expected: from,
                new_price: ensure_not_below_cost(product, to)?,
                reason: PriceChangeReason::AutoPricing,
            }),
            PriceDecision::Skipped { diff, .. } => {
                debug!(product_id = product.id, diff, "Price for {} within hysteresis, unchanged", product.sku);
                None
            }
            PriceDecision::NoRecommendation => None,
        };

        let reason = ranking.as_ref().map(|r| r.recommendation_reason.clone());
        let analyzed = analysis.is_some();
        let benchmark_ok = analysis.as_ref().map_or(true, validate_against_benchmark);
        let outcome = self
            .store
            .commit_product(ProductCommit {
                product_id: product.id,
                analysis,
                ranking,
                alerts,
                price_change,
                committed_at: now,
            })
            .await?;

        if let PriceDecision::Update { from, to } = decision {
            if outcome.price_updated {
                info!(
                    product_id = product.id,
                    "Updating price for {}: {from} -> {to} (reason: {})",
                    product.sku,
                    reason.as_deref().unwrap_or_default()
                );
            } else {
                warn!(product_id = product.id, "Price for {} changed concurrently, update dropped", product.sku);
            }
        }

        Ok(ProductReport {
            product_id: product.id,
            analyzed,
            benchmark_ok,
            alert_ids: outcome.alert_ids,
            decision,
            price_updated: outcome.price_updated,
        })
    }

    /// Alerts for sources whose latest observed price moved more than the threshold
    /// since that source's last snapshot before `now`. Nothing is written here.
    pub async fn check_price_changes(&self, product: &Product, now: DateTime<Utc>) -> Result<Vec<PriceAlert>> {
        let current = self.store.latest_observed_prices(product.id).await?;
        let last = self.store.last_snapshot_per_source(product.id, now).await?;

        let mut alerts = Vec::new();
        for observed in current.iter().filter(|o| o.price > 0.0) {
            let Some(previous) = last.get(&observed.source_id) else {
                continue;
            };
            let Some(change) = percent_change(previous.price, observed.price) else {
                continue;
            };
            if change.abs() <= self.cfg.monitor.alert_change_pct {
                continue;
            }
            let alert = build_alert(product.id, observed.source_id, previous.price, observed.price, change, now);
            warn!(
                event = "PRICE_ALERT",
                product_id = product.id,
                source_id = observed.source_id,
                kind = %alert.kind,
                "Price alert for {}: {}",
                product.sku,
                alert.message
            );
            alerts.push(alert);
        }
        Ok(alerts)
    }
}

/// Commit when the recommendation is more than `hysteresis_abs` currency units or
/// `hysteresis_pct` percent away from the current price.
pub fn decide_price(current: f64, recommended: f64, th: &MonitorThresholds) -> PriceDecision {
    let diff = (recommended - current).abs();
    let diff_pct = if current > 0.0 { diff / current * 100.0 } else { 0.0 };
    if diff > th.hysteresis_abs || diff_pct > th.hysteresis_pct {
        PriceDecision::Update { from: current, to: recommended }
    } else {
        PriceDecision::Skipped { diff, diff_pct }
    }
}

pub fn alert_message(old_price: f64, new_price: f64, change_percent: f64) -> String {
    let direction = if change_percent < 0.0 { "decreased" } else { "increased" };
    format!(
        "Price {direction} by {:.1}% from {old_price} to {new_price}",
        change_percent.abs()
    )
}

fn build_alert(
    product_id: ProductId,
    source_id: SourceId,
    old_price: f64,
    new_price: f64,
    change_percent: f64,
    now: DateTime<Utc>,
) -> PriceAlert {
    PriceAlert {
        id: None,
        product_id,
        source_id,
        kind: AlertKind::from_change(change_percent),
        old_price,
        new_price,
        change_percent,
        message: alert_message(old_price, new_price, change_percent),
        is_acknowledged: false,
        created_at: now,
        acknowledged_at: None,
    }
}
