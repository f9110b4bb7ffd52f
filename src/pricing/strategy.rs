use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::pricing::policy::{ensure_not_below_cost, PricingPolicy};
use crate::stats::PriceStats;
use crate::store::PriceStore;
use crate::types::{PriceChange, PriceChangeReason, PricingStrategy, Product};

/// Outcome of one bulk recompute over all active products.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecomputeSummary {
    pub total_products: u32,
    pub updated_count: u32,
    /// Price moved underneath us between read and write; left untouched.
    pub conflicts: u32,
    pub failures: u32,
}

/// Strategy-driven pricing used by the bulk recompute job.
pub struct StrategyEvaluator {
    store: Arc<dyn PriceStore>,
}

impl StrategyEvaluator {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Price for `product` under `strategy`, or the store's active strategy when None.
    ///
    /// Refreshes the product's cached competitor min/max/avg whenever competitor
    /// prices exist, whether or not the caller goes on to apply the price.
    pub async fn evaluate(&self, product: &Product, strategy: Option<&PricingStrategy>) -> Result<f64> {
        let active;
        let strategy = match strategy {
            Some(s) => s,
            None => {
                active = self.store.active_strategy().await?.ok_or(AppError::NoStrategy)?;
                &active
            }
        };

        let prices: Vec<f64> = self
            .store
            .fetch_in_stock_prices(product.id)
            .await?
            .into_iter()
            .map(|(_, price)| price)
            .collect();
        let stats = PriceStats::from_prices(&prices);

        if let Some(s) = &stats {
            self.store
                .update_competitor_stats(product.id, s.min, s.max, s.avg)
                .await?;
        } else {
            debug!(product_id = product.id, "No competitor prices for {}, using base price", product.sku);
        }

        let price = PricingPolicy::from_strategy(strategy)
            .price(product.cost, stats.as_ref())
            .ok_or(AppError::InsufficientData(product.id))?;

        debug!(
            product_id = product.id,
            cost = product.cost,
            competitors_avg = stats.as_ref().map(|s| s.avg),
            "Calculated price for {}: {price:.2}",
            product.sku
        );
        ensure_not_below_cost(product, price)
    }

    /// Re-prices every active product with the active strategy. A failing product is
    /// logged and counted; the rest continue.
    pub async fn recompute_all(&self, now: DateTime<Utc>) -> Result<RecomputeSummary> {
        let strategy = self.store.active_strategy().await?.ok_or(AppError::NoStrategy)?;
        let products = self.store.active_products().await?;

        let mut summary = RecomputeSummary {
            total_products: products.len() as u32,
            ..Default::default()
        };
        info!("Starting price update for {} products", products.len());

        for product in &products {
            match self.recompute_one(product, &strategy, now).await {
                Ok(Some(true)) => summary.updated_count += 1,
                Ok(Some(false)) => summary.conflicts += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.failures += 1;
                    error!(product_id = product.id, "Error updating price for {}: {e}", product.sku);
                }
            }
        }

        info!(
            updated = summary.updated_count,
            conflicts = summary.conflicts,
            failures = summary.failures,
            "Price update completed"
        );
        Ok(summary)
    }

    /// `None` when the price is already right, otherwise whether the write landed.
    async fn recompute_one(
        &self,
        product: &Product,
        strategy: &PricingStrategy,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>> {
        let new_price = self.evaluate(product, Some(strategy)).await?;
        if new_price == product.our_price {
            return Ok(None);
        }
        let change = PriceChange {
            expected: product.our_price,
            new_price,
            reason: PriceChangeReason::Strategy,
        };
        let applied = self.store.set_product_price(product.id, &change, now).await?;
        Ok(Some(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{now, observe_all, product};
    use crate::store::MemoryStore;

    fn strategy() -> PricingStrategy {
        PricingStrategy {
            id: 1,
            min_markup: 10.0,
            max_markup: 30.0,
            min_margin: 5.0,
            competitor_weight: 0.7,
            popularity_weight: 0.2,
            undercut_percentage: 5.0,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn no_active_strategy_fails() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 120.0));
        let evaluator = StrategyEvaluator::new(store.clone());

        let err = evaluator.evaluate(&product(1, 100.0, 120.0), None).await.unwrap_err();
        assert!(matches!(err, AppError::NoStrategy));
        assert!(matches!(evaluator.recompute_all(now()).await, Err(AppError::NoStrategy)));
    }

    #[tokio::test]
    async fn evaluation_caches_competitor_stats() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 120.0));
        store.insert_strategy(strategy());
        observe_all(&store, 1, &[120.0, 134.0], now());

        let price = StrategyEvaluator::new(store.clone())
            .evaluate(&product(1, 100.0, 120.0), None)
            .await
            .unwrap();
        // avg 127 > 126.5 -> 120.65
        assert!((price - 120.65).abs() < 1e-9);

        let cached = store.product(1).await.unwrap().unwrap();
        assert_eq!(cached.min_price, Some(120.0));
        assert_eq!(cached.max_price, Some(134.0));
        assert_eq!(cached.avg_competitor_price, Some(127.0));
    }

    #[tokio::test]
    async fn recompute_updates_changed_prices_with_history() {
        let store = MemoryStore::new();
        store.insert_strategy(strategy());
        store.insert_product(product(1, 100.0, 105.0));
        store.insert_product(product(2, 100.0, 180.0));
        let mut already_right = product(3, 100.0, 105.0);
        already_right.sku = "FLOOR".to_string();
        store.insert_product(already_right);
        observe_all(&store, 1, &[127.0], now());
        observe_all(&store, 2, &[200.0], now());
        observe_all(&store, 3, &[90.0], now());

        let summary = StrategyEvaluator::new(store.clone()).recompute_all(now()).await.unwrap();
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.updated_count, 2);
        assert_eq!(summary.failures, 0);

        // avg 200 -> 190, capped at 130
        let p2 = store.product(2).await.unwrap().unwrap();
        assert!((p2.our_price - 130.0).abs() < 1e-9);
        let history = store.price_history(2).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, PriceChangeReason::Strategy);
        assert_eq!(history[0].old_price, 180.0);
        assert!(store.price_history(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_markup_strategy_cannot_price_below_cost() {
        let store = MemoryStore::new();
        let mut s = strategy();
        s.min_markup = -50.0;
        s.max_markup = -20.0;
        s.min_margin = -60.0;
        store.insert_strategy(s);
        store.insert_product(product(1, 100.0, 120.0));

        let summary = StrategyEvaluator::new(store.clone()).recompute_all(now()).await.unwrap();
        assert_eq!(summary.failures, 1);
        assert_eq!(store.product(1).await.unwrap().unwrap().our_price, 120.0);
    }
}
