pub mod price_monitor;
pub mod source_check;

pub use price_monitor::{
    alert_message, decide_price, PriceDecision, PriceMonitor, ProductReport, SweepStats,
};
pub use source_check::SourceCheck;
