use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::analyzer::trend::compute_trends;
use crate::benchmark::{benchmark_deviation, BenchmarkProvider};
use crate::config::anomaly_thresholds::{HIGH_VARIANCE_RATIO, SHARP_MOVE_PCT};
use crate::error::{AppError, Result};
use crate::stats::PriceStats;
use crate::store::PriceStore;
use crate::types::{MarketAnalysis, Outcome, Product, ProductId};

/// Point-in-time market statistics for one product.
pub struct MarketAnalyzer {
    store: Arc<dyn PriceStore>,
    benchmark: Arc<dyn BenchmarkProvider>,
}

impl MarketAnalyzer {
    pub fn new(store: Arc<dyn PriceStore>, benchmark: Arc<dyn BenchmarkProvider>) -> Self {
        Self { store, benchmark }
    }

    /// Builds the analysis without writing it. `NoData` when no competitor has a
    /// qualifying price.
    pub async fn compute(&self, product: &Product, now: DateTime<Utc>) -> Result<Outcome<MarketAnalysis>> {
        let prices: Vec<f64> = self
            .store
            .fetch_in_stock_prices(product.id)
            .await?
            .into_iter()
            .map(|(_, price)| price)
            .collect();

        let Some(stats) = PriceStats::from_prices(&prices) else {
            debug!(product_id = product.id, "No competitor prices for {}", product.sku);
            return Ok(Outcome::NoData);
        };

        let benchmark_price = self
            .benchmark
            .lookup_benchmark(&product.name, &product.sku)
            .await;
        let deviation = benchmark_price.and_then(|b| benchmark_deviation(product.our_price, b));

        let trend = compute_trends(self.store.as_ref(), product.id, now).await?;

        Ok(Outcome::Ready(MarketAnalysis {
            product_id: product.id,
            active_sellers_count: stats.count() as u32,
            price_min: stats.min,
            price_max: stats.max,
            price_avg: stats.avg,
            price_median: stats.median,
            price_std_dev: Some(stats.std_dev),
            our_position: stats.position_of(product.our_price),
            our_price_percentile: stats.percentile_of(product.our_price),
            benchmark_price,
            benchmark_deviation: deviation,
            is_price_stable: is_stable(stats.std_dev, stats.avg, trend.trend_24h),
            trend,
            analyzed_at: now,
        }))
    }

    /// Computes and upserts the product's analysis row. Nothing is written on `NoData`.
    pub async fn analyze(&self, product_id: ProductId, now: DateTime<Utc>) -> Result<Outcome<MarketAnalysis>> {
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;

        let outcome = self.compute(&product, now).await?;
        if let Outcome::Ready(analysis) = &outcome {
            self.store.upsert_analysis(analysis).await?;
            info!(
                product_id,
                sellers = analysis.active_sellers_count,
                position = %analysis.our_position,
                "Market analysis completed for {}",
                product.sku
            );
        }
        Ok(outcome)
    }
}

/// Unstable when competitors disagree wildly or the market moved sharply in a day.
pub fn is_stable(std_dev: f64, avg: f64, trend_24h: Option<f64>) -> bool {
    let high_variance = std_dev > avg * HIGH_VARIANCE_RATIO;
    let sharp_move = trend_24h.is_some_and(|t| t.abs() > SHARP_MOVE_PCT);
    !(high_variance || sharp_move)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::tests::FixedBenchmark;
    use crate::benchmark::NoBenchmark;
    use crate::fixtures::{now, observe_all, product, snapshot};
    use crate::store::MemoryStore;
    use crate::types::{MarketPosition, PriceTrend};
    use chrono::Duration;

    fn analyzer(store: &Arc<MemoryStore>) -> MarketAnalyzer {
        MarketAnalyzer::new(store.clone(), Arc::new(NoBenchmark))
    }

    #[tokio::test]
    async fn analysis_of_three_competitors() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 200.0));
        observe_all(&store, 1, &[130.0, 120.0, 140.0], now());

        let a = analyzer(&store).analyze(1, now()).await.unwrap().ready().unwrap();
        assert_eq!(a.active_sellers_count, 3);
        assert_eq!((a.price_min, a.price_max, a.price_avg, a.price_median), (120.0, 140.0, 130.0, 130.0));
        assert!((a.price_std_dev.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(a.our_position, MarketPosition::MostExpensive);
        assert_eq!(a.our_price_percentile, 100.0);
        assert_eq!(a.benchmark_price, None);
        assert_eq!(a.trend.direction, PriceTrend::Stable);
        assert!(a.is_price_stable);
        assert_eq!(store.analysis(1).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn missing_product_is_an_error() {
        let store = MemoryStore::new();
        let err = analyzer(&store).analyze(42, now()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn no_prices_writes_nothing() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 150.0));
        store.record_observed_price(crate::types::ObservedPrice {
            product_id: 1,
            source_id: 1,
            price: 120.0,
            in_stock: false,
            observed_at: now(),
        });

        let outcome = analyzer(&store).analyze(1, now()).await.unwrap();
        assert!(outcome.is_no_data());
        assert_eq!(store.analysis(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rerun_with_same_inputs_is_identical() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 131.0));
        observe_all(&store, 1, &[0.1, 0.2, 0.3, 129.99, 250.0], now());
        snapshot(&store, 1, 1, 100.0, now()).await;
        snapshot(&store, 1, 1, 90.0, now() - Duration::hours(24)).await;

        let a = analyzer(&store);
        let first = a.analyze(1, now()).await.unwrap().ready().unwrap();
        let second = a
            .analyze(1, now() + Duration::seconds(5))
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(first.price_avg.to_bits(), second.price_avg.to_bits());
        assert_eq!(first.price_std_dev, second.price_std_dev);
        assert_eq!(MarketAnalysis { analyzed_at: first.analyzed_at, ..second }, first);
    }

    #[tokio::test]
    async fn benchmark_deviation_recorded() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 150.0));
        observe_all(&store, 1, &[140.0, 160.0], now());

        let a = MarketAnalyzer::new(store.clone(), Arc::new(FixedBenchmark(120.0)));
        let analysis = a.compute(&product(1, 100.0, 150.0), now()).await.unwrap().ready().unwrap();
        assert_eq!(analysis.benchmark_price, Some(120.0));
        assert_eq!(analysis.benchmark_deviation, Some(25.0));
        // compute alone never writes
        assert_eq!(store.analysis(1).await.unwrap(), None);
    }

    #[test]
    fn stability_flag() {
        assert!(is_stable(10.0, 100.0, Some(9.9)));
        assert!(!is_stable(51.0, 100.0, None));
        assert!(!is_stable(10.0, 100.0, Some(-12.0)));
    }
}
