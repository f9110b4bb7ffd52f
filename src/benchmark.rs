use async_trait::async_trait;
use tracing::warn;

use crate::config::anomaly_thresholds::BENCHMARK_VALIDATION_PCT;
use crate::types::MarketAnalysis;

/// Optional third-party reference price (e.g. a large marketplace listing).
/// Lookups are best-effort: `None` means no benchmark, never an error.
#[async_trait]
pub trait BenchmarkProvider: Send + Sync {
    async fn lookup_benchmark(&self, product_name: &str, sku: &str) -> Option<f64>;
}

/// Default provider when no benchmark source is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBenchmark;

#[async_trait]
impl BenchmarkProvider for NoBenchmark {
    async fn lookup_benchmark(&self, _product_name: &str, _sku: &str) -> Option<f64> {
        None
    }
}

/// Percent deviation of our price from the benchmark; None for a non-positive benchmark.
pub fn benchmark_deviation(our_price: f64, benchmark: f64) -> Option<f64> {
    if benchmark <= 0.0 {
        return None;
    }
    Some((our_price - benchmark) / benchmark * 100.0)
}

/// False when our price strays more than 30% from the benchmark.
/// An analysis without benchmark data passes.
pub fn validate_against_benchmark(analysis: &MarketAnalysis) -> bool {
    let Some(deviation) = analysis.benchmark_deviation else {
        return true;
    };
    if deviation.abs() > BENCHMARK_VALIDATION_PCT {
        warn!(
            product_id = analysis.product_id,
            deviation, "Price deviates {deviation:.1}% from benchmark"
        );
        return false;
    }
    true
}
