use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::anomaly_thresholds as t;
use crate::error::Result;
use crate::store::PriceStore;
use crate::types::{Anomaly, MarketAnalysis, ProductId};

/// Rules over a stored analysis, in a fixed order. Empty when the analysis carries no
/// standard deviation or a zero one (a single seller, or every seller at one price).
pub fn detect(analysis: &MarketAnalysis) -> Vec<Anomaly> {
    let Some(std_dev) = analysis.price_std_dev.filter(|d| *d != 0.0) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    if std_dev > analysis.price_avg * t::HIGH_VARIANCE_RATIO {
        found.push(Anomaly::HighPriceVariance);
    }
    if analysis
        .trend
        .trend_24h
        .is_some_and(|d| d.abs() > t::SHARP_MOVE_PCT)
    {
        found.push(Anomaly::SharpPriceMovement);
    }
    let pct = analysis.our_price_percentile;
    if pct < t::OUTLIER_LOW_PERCENTILE || pct > t::OUTLIER_HIGH_PERCENTILE {
        found.push(Anomaly::PriceOutlier);
    }
    if analysis
        .benchmark_deviation
        .is_some_and(|d| d.abs() > t::BENCHMARK_DEVIATION_PCT)
    {
        found.push(Anomaly::BenchmarkDeviation);
    }
    found
}

/// Read-only diagnostics over the product's current analysis.
pub struct AnomalyDetector {
    store: Arc<dyn PriceStore>,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// No analysis yet means no anomalies.
    pub async fn detect_for(&self, product_id: ProductId) -> Result<Vec<Anomaly>> {
        let Some(analysis) = self.store.analysis(product_id).await? else {
            debug!(product_id, "No analysis stored, skipping anomaly check");
            return Ok(Vec::new());
        };
        let found = detect(&analysis);
        if !found.is_empty() {
            let tags: Vec<&str> = found.iter().map(Anomaly::as_str).collect();
            warn!(product_id, anomalies = ?tags, "Price anomalies detected");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{now, product};
    use crate::store::MemoryStore;
    use crate::types::{MarketPosition, TrendDeltas};

    fn analysis() -> MarketAnalysis {
        MarketAnalysis {
            product_id: 1,
            active_sellers_count: 4,
            price_min: 90.0,
            price_max: 110.0,
            price_avg: 100.0,
            price_median: 100.0,
            price_std_dev: Some(8.0),
            our_position: MarketPosition::Median,
            our_price_percentile: 50.0,
            benchmark_price: None,
            benchmark_deviation: None,
            trend: TrendDeltas::default(),
            is_price_stable: true,
            analyzed_at: now(),
        }
    }

    #[test]
    fn quiet_market_has_no_anomalies() {
        assert!(detect(&analysis()).is_empty());
    }

    #[test]
    fn percentile_boundaries_do_not_fire() {
        let mut a = analysis();
        for (pct, fires) in [(10.0, false), (90.0, false), (9.99, true), (90.01, true), (0.0, true), (100.0, true)] {
            a.our_price_percentile = pct;
            assert_eq!(detect(&a).contains(&Anomaly::PriceOutlier), fires, "percentile {pct}");
        }
    }

    #[test]
    fn every_rule_fires_independently() {
        let mut a = analysis();
        a.price_std_dev = Some(50.1);
        a.trend.trend_24h = Some(-10.5);
        a.our_price_percentile = 95.0;
        a.benchmark_deviation = Some(21.0);
        assert_eq!(
            detect(&a),
            vec![
                Anomaly::HighPriceVariance,
                Anomaly::SharpPriceMovement,
                Anomaly::PriceOutlier,
                Anomaly::BenchmarkDeviation,
            ]
        );
    }

    #[test]
    fn thresholds_are_strict() {
        let mut a = analysis();
        a.price_std_dev = Some(50.0);
        a.trend.trend_24h = Some(10.0);
        a.benchmark_deviation = Some(-20.0);
        assert!(detect(&a).is_empty());
    }

    #[test]
    fn missing_deviation_is_a_no_op() {
        let mut a = analysis();
        a.price_std_dev = None;
        a.our_price_percentile = 100.0;
        assert!(detect(&a).is_empty());
    }

    #[test]
    fn zero_deviation_is_a_no_op() {
        let mut a = analysis();
        a.price_std_dev = Some(0.0);
        a.our_price_percentile = 100.0;
        a.trend.trend_24h = Some(25.0);
        assert!(detect(&a).is_empty());
    }

    #[tokio::test]
    async fn single_competitor_market_has_no_anomalies() {
        use crate::benchmark::NoBenchmark;
        use crate::config::EngineConfig;
        use crate::fixtures::observe_all;
        use crate::monitor::PriceMonitor;

        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 160.0));
        observe_all(&store, 1, &[150.0], now());
        PriceMonitor::new(store.clone(), Arc::new(NoBenchmark), EngineConfig::default())
            .monitor_all_products(now())
            .await
            .unwrap();

        let stored = store.analysis(1).await.unwrap().unwrap();
        assert_eq!(stored.price_std_dev, Some(0.0));
        assert_eq!(stored.our_price_percentile, 100.0);
        assert!(AnomalyDetector::new(store.clone()).detect_for(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detector_reads_stored_analysis() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 80.0, 100.0));
        let detector = AnomalyDetector::new(store.clone());
        assert!(detector.detect_for(1).await.unwrap().is_empty());

        let mut a = analysis();
        a.our_price_percentile = 100.0;
        store.upsert_analysis(&a).await.unwrap();
        assert_eq!(detector.detect_for(1).await.unwrap(), vec![Anomaly::PriceOutlier]);
    }
}
