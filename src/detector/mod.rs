pub mod anomaly;

pub use anomaly::{detect, AnomalyDetector};
