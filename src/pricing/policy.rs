use serde::Serialize;

use crate::config::{pricing_factors, PricingConfig};
use crate::error::{AppError, Result};
use crate::stats::{round2, PriceStats};
use crate::types::{PricingStrategy, Product};

/// The two price formulas the engine runs. They answer the same question from the
/// same inputs but are driven by different jobs and are kept apart on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PricingPolicy {
    /// Ranker: undercut the competitor average by 2%, clamp, round to cents.
    UndercutAverage { min_margin: f64, max_markup: f64 },
    /// Bulk recompute: markup-based base price nudged by where the market sits.
    StrategyBands {
        min_markup: f64,
        max_markup: f64,
        min_margin: f64,
    },
}

impl PricingPolicy {
    pub fn from_config(cfg: &PricingConfig) -> Self {
        PricingPolicy::UndercutAverage {
            min_margin: cfg.min_margin,
            max_markup: cfg.markup_max,
        }
    }

    pub fn from_strategy(strategy: &PricingStrategy) -> Self {
        PricingPolicy::StrategyBands {
            min_markup: strategy.min_markup,
            max_markup: strategy.max_markup,
            min_margin: strategy.min_margin,
        }
    }

    fn min_margin(&self) -> f64 {
        match *self {
            PricingPolicy::UndercutAverage { min_margin, .. } => min_margin,
            PricingPolicy::StrategyBands { min_margin, .. } => min_margin,
        }
    }

    fn max_markup(&self) -> f64 {
        match *self {
            PricingPolicy::UndercutAverage { max_markup, .. } => max_markup,
            PricingPolicy::StrategyBands { max_markup, .. } => max_markup,
        }
    }

    /// `cost + min_margin`
    pub fn floor(&self, cost: f64) -> f64 {
        cost + self.min_margin()
    }

    /// `cost * (1 + max_markup%)`
    pub fn ceiling(&self, cost: f64) -> f64 {
        cost * (1.0 + self.max_markup() / 100.0)
    }

    /// Raise to the floor, then cap at the ceiling. When the two cross the ceiling wins.
    pub fn clamp(&self, price: f64, cost: f64) -> f64 {
        price.max(self.floor(cost)).min(self.ceiling(cost))
    }

    /// Price for a product costing `cost` given the competitor stats, if any.
    ///
    /// `UndercutAverage` has nothing to say without competitors and returns None.
    /// `StrategyBands` falls back to `max(base, floor)` with no ceiling applied.
    pub fn price(&self, cost: f64, market: Option<&PriceStats>) -> Option<f64> {
        match *self {
            PricingPolicy::UndercutAverage { .. } => {
                let stats = market?;
                let raw = stats.avg * pricing_factors::UNDERCUT_AVERAGE;
                Some(round2(self.clamp(raw, cost)))
            }
            PricingPolicy::StrategyBands { min_markup, .. } => {
                let base = cost * (1.0 + min_markup / 100.0);
                let Some(stats) = market else {
                    return Some(base.max(self.floor(cost)));
                };
                let avg = stats.avg;
                let raw = if avg > base * pricing_factors::RICH_MARKET {
                    avg * pricing_factors::RICH_MARKET_PRICE
                } else if avg < base * pricing_factors::CHEAP_MARKET {
                    avg * pricing_factors::CHEAP_MARKET_PRICE
                } else {
                    base.max(avg * pricing_factors::UNDERCUT_AVERAGE)
                };
                Some(self.clamp(raw, cost))
            }
        }
    }
}

/// The engine never sets a price under cost.
pub fn ensure_not_below_cost(product: &Product, price: f64) -> Result<f64> {
    if price < product.cost {
        return Err(AppError::BelowCost {
            product_id: product.id,
            price,
            cost: product.cost,
        });
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::product;

    fn undercut() -> PricingPolicy {
        PricingPolicy::from_config(&PricingConfig::default())
    }

    fn bands() -> PricingPolicy {
        PricingPolicy::StrategyBands {
            min_markup: 10.0,
            max_markup: 30.0,
            min_margin: 5.0,
        }
    }

    fn stats(prices: &[f64]) -> PriceStats {
        PriceStats::from_prices(prices).unwrap()
    }

    #[test]
    fn undercut_needs_competitors() {
        assert_eq!(undercut().price(100.0, None), None);
    }

    #[test]
    fn ceiling_wins_when_bounds_cross() {
        // floor 150 > ceiling 130
        let p = undercut().price(100.0, Some(&stats(&[120.0, 130.0, 140.0]))).unwrap();
        assert_eq!(p, 130.0);
    }

    #[test]
    fn undercut_within_bounds_rounds_to_cents() {
        let policy = PricingPolicy::UndercutAverage { min_margin: 10.0, max_markup: 50.0 };
        // avg 133.33.. * 0.98 = 130.666..
        let p = policy.price(100.0, Some(&stats(&[120.0, 130.0, 150.0]))).unwrap();
        assert_eq!(p, 130.67);
    }

    #[test]
    fn undercut_respects_bounds_when_consistent() {
        let policy = PricingPolicy::UndercutAverage { min_margin: 10.0, max_markup: 40.0 };
        for set in [&[50.0][..], &[100.0, 105.0], &[300.0, 900.0], &[111.0, 112.0, 113.0]] {
            let p = policy.price(100.0, Some(&stats(set))).unwrap();
            assert!((110.0..=140.0).contains(&p), "{set:?} -> {p}");
        }
    }

    #[test]
    fn bands_without_competitors_skip_ceiling() {
        // base 110, floor 105
        let p = bands().price(100.0, None).unwrap();
        assert!((p - 110.0).abs() < 1e-9);
        let wide_margin = PricingPolicy::StrategyBands {
            min_markup: 10.0,
            max_markup: 30.0,
            min_margin: 80.0,
        };
        assert_eq!(wide_margin.price(100.0, None), Some(180.0));
    }

    #[test]
    fn bands_rich_market_undercuts_by_five_percent() {
        // base 110, avg 127 > 126.5
        let p = bands().price(100.0, Some(&stats(&[127.0]))).unwrap();
        assert!((p - 120.65).abs() < 1e-9);
    }

    #[test]
    fn bands_cheap_market_adds_premium() {
        // avg 90 < 93.5 -> 91.8, raised to floor 105
        assert_eq!(bands().price(100.0, Some(&stats(&[90.0]))), Some(105.0));
        let loose = PricingPolicy::StrategyBands {
            min_markup: 30.0,
            max_markup: 30.0,
            min_margin: 0.0,
        };
        // base 130, avg 105 < 110.5 -> 107.1
        let p = loose.price(100.0, Some(&stats(&[105.0]))).unwrap();
        assert!((p - 107.1).abs() < 1e-9);
    }

    #[test]
    fn bands_close_market_keeps_base() {
        // avg 112 inside the band: max(110, 109.76) = 110
        let p = bands().price(100.0, Some(&stats(&[112.0]))).unwrap();
        assert!((p - 110.0).abs() < 1e-9);
    }

    #[test]
    fn below_cost_rejected() {
        let p = product(1, 100.0, 150.0);
        assert_eq!(ensure_not_below_cost(&p, 100.0).unwrap(), 100.0);
        assert!(matches!(
            ensure_not_below_cost(&p, 99.99),
            Err(AppError::BelowCost { product_id: 1, .. })
        ));
    }
}
