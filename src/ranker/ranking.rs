use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::PricingConfig;
use crate::error::{AppError, Result};
use crate::pricing::PricingPolicy;
use crate::stats::PriceStats;
use crate::store::PriceStore;
use crate::types::{Outcome, PriceRanking, Product, ProductId};

/// Where our price sits among competitors, plus what it should be.
pub struct PriceRanker {
    store: Arc<dyn PriceStore>,
}

impl PriceRanker {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Builds the ranking without writing it.
    pub async fn compute(
        &self,
        product: &Product,
        cfg: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<Outcome<PriceRanking>> {
        let prices: Vec<f64> = self
            .store
            .fetch_in_stock_prices(product.id)
            .await?
            .into_iter()
            .map(|(_, price)| price)
            .collect();

        match PriceStats::from_prices(&prices) {
            Some(stats) => Ok(Outcome::Ready(build_ranking(product, &stats, cfg, now))),
            None => {
                debug!(product_id = product.id, "Nothing to rank {} against", product.sku);
                Ok(Outcome::NoData)
            }
        }
    }

    /// Computes and upserts the product's ranking row. Nothing is written on `NoData`.
    pub async fn rank(
        &self,
        product_id: ProductId,
        cfg: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<Outcome<PriceRanking>> {
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;

        let outcome = self.compute(&product, cfg, now).await?;
        if let Outcome::Ready(ranking) = &outcome {
            self.store.upsert_ranking(ranking).await?;
            info!(
                product_id,
                "Price ranking created for {}: rank {}/{}",
                product.sku,
                ranking.our_rank,
                ranking.total_competitors
            );
        }
        Ok(outcome)
    }
}

pub fn build_ranking(
    product: &Product,
    stats: &PriceStats,
    cfg: &PricingConfig,
    now: DateTime<Utc>,
) -> PriceRanking {
    let our = product.our_price;
    let recommended_price = PricingPolicy::from_config(cfg)
        .price(product.cost, Some(stats))
        .unwrap_or(our);

    PriceRanking {
        product_id: product.id,
        total_competitors: stats.count() as u32,
        our_rank: stats.rank_of(our),
        price_above_cheapest: our - stats.min,
        price_below_most_expensive: stats.max - our,
        recommended_price,
        recommendation_reason: recommendation_reason(our, stats).to_string(),
        analyzed_at: now,
    }
}

/// First matching case wins: above max, below min, above avg, below avg, at avg.
pub fn recommendation_reason(our_price: f64, stats: &PriceStats) -> &'static str {
    if our_price > stats.max {
        "Our price is highest. Recommend lowering to stay competitive."
    } else if our_price < stats.min {
        "Our price is lowest. Can increase while remaining competitive."
    } else if our_price > stats.avg {
        "Our price is above average. Consider lowering to match market."
    } else if our_price < stats.avg {
        "Our price is below average. Good competitive position."
    } else {
        "Price is at market average. Consider undercutting for more sales."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{now, observe_all, product};
    use crate::store::MemoryStore;
    use crate::types::MarketPosition;

    fn stats(prices: &[f64]) -> PriceStats {
        PriceStats::from_prices(prices).unwrap()
    }

    #[tokio::test]
    async fn overpriced_product_scenario() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 200.0));
        observe_all(&store, 1, &[140.0, 120.0, 130.0], now());

        let cfg = PricingConfig {
            min_margin: 50.0,
            markup_max: 30.0,
            ..Default::default()
        };
        let ranking = PriceRanker::new(store.clone())
            .rank(1, &cfg, now())
            .await
            .unwrap()
            .ready()
            .unwrap();

        assert_eq!(ranking.our_rank, 4);
        assert_eq!(ranking.total_competitors, 3);
        assert_eq!(ranking.price_above_cheapest, 80.0);
        assert_eq!(ranking.price_below_most_expensive, -60.0);
        assert!(ranking.recommended_price <= 130.0);
        assert!(ranking.recommendation_reason.contains("lowering"));
        assert_eq!(stats(&[120.0, 130.0, 140.0]).position_of(200.0), MarketPosition::MostExpensive);
        assert_eq!(store.ranking(1).await.unwrap(), Some(ranking));
    }

    #[tokio::test]
    async fn no_prices_means_no_ranking() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 100.0, 150.0));

        let outcome = PriceRanker::new(store.clone())
            .rank(1, &PricingConfig::default(), now())
            .await
            .unwrap();
        assert!(outcome.is_no_data());
        assert_eq!(store.ranking(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = MemoryStore::new();
        let err = PriceRanker::new(store)
            .rank(9, &PricingConfig::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProductNotFound(9)));
    }

    #[test]
    fn carried_settings_do_not_move_recommendation() {
        let p = product(1, 100.0, 200.0);
        let market = stats(&[120.0, 130.0, 140.0]);
        let base = build_ranking(&p, &market, &PricingConfig::default(), now());

        let tweaked = PricingConfig {
            markup_min: 25.0,
            competitor_weight: 0.1,
            popularity_weight: 0.9,
            ..PricingConfig::default()
        };
        let ranked = build_ranking(&p, &market, &tweaked, now());
        assert_eq!(ranked.recommended_price, base.recommended_price);
        assert_eq!(ranked.recommended_price, 130.0);
    }

    #[test]
    fn tie_with_competitor_does_not_improve_rank() {
        let s = stats(&[120.0, 130.0, 140.0]);
        let mut p = product(1, 50.0, 130.0);
        let tied = build_ranking(&p, &s, &PricingConfig::default(), now());
        assert_eq!(tied.our_rank, 3);
        p.our_price = 129.99;
        let under = build_ranking(&p, &s, &PricingConfig::default(), now());
        assert_eq!(under.our_rank, 2);
    }

    #[test]
    fn reason_cases_in_order() {
        let s = stats(&[100.0, 120.0, 110.0]);
        assert!(recommendation_reason(121.0, &s).starts_with("Our price is highest"));
        assert!(recommendation_reason(99.0, &s).starts_with("Our price is lowest"));
        assert!(recommendation_reason(115.0, &s).starts_with("Our price is above average"));
        assert!(recommendation_reason(105.0, &s).starts_with("Our price is below average"));
        assert!(recommendation_reason(110.0, &s).starts_with("Price is at market average"));
        // equal to max is not "highest"
        assert!(recommendation_reason(120.0, &s).starts_with("Our price is above average"));
    }
}
