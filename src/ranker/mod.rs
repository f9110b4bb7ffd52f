pub mod ranking;

pub use ranking::{build_ranking, recommendation_reason, PriceRanker};
