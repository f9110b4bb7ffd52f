pub mod policy;
pub mod strategy;

pub use policy::{ensure_not_below_cost, PricingPolicy};
pub use strategy::{RecomputeSummary, StrategyEvaluator};
