pub mod market;
pub mod trend;

pub use market::MarketAnalyzer;
pub use trend::compute_trends;
