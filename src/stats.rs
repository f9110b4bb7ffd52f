//! Pure statistics over a competitor price set. No I/O, no clock.

use crate::config::position_bands;
use crate::types::MarketPosition;

/// Summary statistics of a non-empty price set.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    /// Ascending.
    pub sorted: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    /// Sample standard deviation; 0 with fewer than two prices.
    pub std_dev: f64,
}

impl PriceStats {
    /// Returns None for an empty set. Prices are sorted first so the result does not
    /// depend on the order the store returned them in.
    pub fn from_prices(prices: &[f64]) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }
        let mut sorted = prices.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let min = sorted[0];
        let max = sorted[n - 1];
        let avg = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let std_dev = if n < 2 {
            0.0
        } else {
            let ss: f64 = sorted.iter().map(|p| (p - avg).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };

        Some(Self { sorted, min, max, avg, median, std_dev })
    }

    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn position_of(&self, our_price: f64) -> MarketPosition {
        position(our_price, self.min, self.max, self.avg)
    }

    pub fn percentile_of(&self, our_price: f64) -> f64 {
        percentile(our_price, &self.sorted)
    }

    pub fn rank_of(&self, our_price: f64) -> u32 {
        rank(our_price, &self.sorted)
    }
}

/// Boundaries are checked in order: min, max, then the ±5% band around the average.
pub fn position(our_price: f64, min: f64, max: f64, avg: f64) -> MarketPosition {
    if our_price <= min {
        MarketPosition::Cheapest
    } else if our_price >= max {
        MarketPosition::MostExpensive
    } else if our_price <= avg * position_bands::BELOW {
        MarketPosition::BelowMedian
    } else if our_price >= avg * position_bands::ABOVE {
        MarketPosition::AboveMedian
    } else {
        MarketPosition::Median
    }
}

/// Share of competitor prices at or below ours, in percent.
pub fn percentile(our_price: f64, prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let at_or_below = prices.iter().filter(|&&p| p <= our_price).count();
    at_or_below as f64 / prices.len() as f64 * 100.0
}

/// 1-based position of the first competitor price strictly above ours in `sorted`.
/// Competitors tied with our price are counted ahead of us. Dearer than everyone
/// ranks `len + 1`.
pub fn rank(our_price: f64, sorted: &[f64]) -> u32 {
    sorted
        .iter()
        .position(|&p| p > our_price)
        .map(|i| i + 1)
        .unwrap_or(sorted.len() + 1) as u32
}

/// `(new - old) / old * 100`; None when `old` is zero.
pub fn percent_change(old: f64, new: f64) -> Option<f64> {
    if old == 0.0 {
        None
    } else {
        Some((new - old) / old * 100.0)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETS: &[&[f64]] = &[
        &[100.0],
        &[120.0, 130.0, 140.0],
        &[5.0, 5.0, 5.0, 5.0],
        &[999.99, 0.01, 450.5, 12.0],
        &[3.0, 1.0, 2.0, 10_000.0, 7.5, 7.5],
    ];

    #[test]
    fn empty_set_has_no_stats() {
        assert!(PriceStats::from_prices(&[]).is_none());
    }

    #[test]
    fn median_and_avg_bounded_by_extremes() {
        for set in SETS {
            let s = PriceStats::from_prices(set).unwrap();
            assert!(s.min <= s.median && s.median <= s.max, "{set:?}");
            assert!(s.min <= s.avg && s.avg <= s.max, "{set:?}");
        }
    }

    #[test]
    fn known_values() {
        let s = PriceStats::from_prices(&[140.0, 120.0, 130.0]).unwrap();
        assert_eq!(s.min, 120.0);
        assert_eq!(s.max, 140.0);
        assert_eq!(s.avg, 130.0);
        assert_eq!(s.median, 130.0);
        assert!((s.std_dev - 10.0).abs() < 1e-9);

        let even = PriceStats::from_prices(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(even.median, 2.5);
    }

    #[test]
    fn single_price_has_zero_deviation() {
        let s = PriceStats::from_prices(&[42.0]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.count(), 1);
    }

    #[test]
    fn input_order_does_not_change_bits() {
        let a = PriceStats::from_prices(&[0.1, 0.2, 0.3, 1e9]).unwrap();
        let b = PriceStats::from_prices(&[1e9, 0.3, 0.1, 0.2]).unwrap();
        assert_eq!(a.avg.to_bits(), b.avg.to_bits());
        assert_eq!(a.std_dev.to_bits(), b.std_dev.to_bits());
    }

    #[test]
    fn position_labels() {
        let s = PriceStats::from_prices(&[120.0, 130.0, 140.0]).unwrap();
        assert_eq!(s.position_of(100.0), MarketPosition::Cheapest);
        assert_eq!(s.position_of(120.0), MarketPosition::Cheapest);
        assert_eq!(s.position_of(140.0), MarketPosition::MostExpensive);
        assert_eq!(s.position_of(200.0), MarketPosition::MostExpensive);
        // avg 130: below band <= 123.5, above band >= 136.5
        assert_eq!(s.position_of(123.0), MarketPosition::BelowMedian);
        assert_eq!(s.position_of(137.0), MarketPosition::AboveMedian);
        assert_eq!(s.position_of(130.0), MarketPosition::Median);
    }

    #[test]
    fn percentile_counts_ties() {
        let prices = [120.0, 130.0, 140.0];
        assert_eq!(percentile(100.0, &prices), 0.0);
        assert!((percentile(130.0, &prices) - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(percentile(200.0, &prices), 100.0);
    }

    #[test]
    fn rank_bounds_hold() {
        for set in SETS {
            let s = PriceStats::from_prices(set).unwrap();
            for our in [0.0, s.min, s.avg, s.median, s.max, s.max + 1.0] {
                let r = s.rank_of(our);
                assert!(r >= 1 && r as usize <= s.count() + 1);
                // Last place means no competitor is strictly dearer.
                let none_dearer = s.sorted.iter().all(|&p| our >= p);
                assert_eq!(r as usize == s.count() + 1, none_dearer, "{set:?} our={our}");
            }
        }
    }

    #[test]
    fn rank_counts_tied_competitors_ahead() {
        // Equal to the cheapest: the first strictly dearer price is at index 1.
        assert_eq!(rank(120.0, &[120.0, 130.0, 140.0]), 2);
        // Equal to every competitor: nobody is strictly dearer.
        assert_eq!(rank(50.0, &[50.0, 50.0]), 3);
        assert_eq!(rank(100.0, &[120.0, 130.0, 140.0]), 1);
        assert_eq!(rank(200.0, &[120.0, 130.0, 140.0]), 4);
    }

    #[test]
    fn percent_change_guards_zero() {
        assert_eq!(percent_change(0.0, 10.0), None);
        assert!((percent_change(100.0, 115.0).unwrap() - 15.0).abs() < 1e-9);
        assert!((percent_change(100.0, 80.0).unwrap() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round2(127.4), 127.4);
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(99.994), 99.99);
    }
}
