//! Shared test builders.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::store::MemoryStore;
use crate::types::{
    ObservedPrice, PriceSnapshot, PriceSource, Product, ProductId, ProductSourceMapping, SourceId,
    SourceStatus,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

pub fn product(id: ProductId, cost: f64, our_price: f64) -> Product {
    Product {
        id,
        sku: format!("SKU-{id}"),
        name: format!("Product {id}"),
        cost,
        our_price,
        min_price: None,
        max_price: None,
        avg_competitor_price: None,
        is_active: true,
    }
}

pub fn source(id: SourceId) -> PriceSource {
    PriceSource {
        id,
        name: format!("shop-{id}"),
        source_type: "competitor_site".to_string(),
        is_active: true,
        check_status: SourceStatus::Pending,
        last_checked: None,
        last_error: None,
    }
}

pub fn mapping(id: i64, product_id: ProductId, source_id: SourceId, last_price: Option<f64>) -> ProductSourceMapping {
    ProductSourceMapping { id, product_id, source_id, last_price, is_active: true }
}

/// Records one in-stock observation per price, source ids counting up from 1.
pub fn observe_all(store: &MemoryStore, product_id: ProductId, prices: &[f64], at: DateTime<Utc>) {
    for (i, &price) in prices.iter().enumerate() {
        store.record_observed_price(ObservedPrice {
            product_id,
            source_id: i as SourceId + 1,
            price,
            in_stock: true,
            observed_at: at,
        });
    }
}

pub async fn snapshot(store: &Arc<MemoryStore>, product_id: ProductId, source_id: SourceId, price: f64, at: DateTime<Utc>) {
    use crate::store::PriceStore;
    store
        .append_snapshot(&PriceSnapshot { product_id, source_id, price, in_stock: true, snapshot_at: at })
        .await
        .unwrap();
}
