use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Price source not found: {0}")]
    SourceNotFound(i64),

    #[error("Price alert not found: {0}")]
    AlertNotFound(i64),

    #[error("No pricing strategy configured")]
    NoStrategy,

    #[error("No in-stock competitor prices for product {0}")]
    InsufficientData(i64),

    #[error("Refusing to price product {product_id} at {price:.2}, below cost {cost:.2}")]
    BelowCost { product_id: i64, price: f64, cost: f64 },

    #[error("Sweep made no progress: all {total_products} products failed")]
    NoProgress { total_products: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::ProductNotFound(_)
                | AppError::SourceNotFound(_)
                | AppError::AlertNotFound(_)
                | AppError::NoStrategy
        )
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, AppError::InsufficientData(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_helpers() {
        assert!(AppError::ProductNotFound(1).is_not_found());
        assert!(AppError::NoStrategy.is_not_found());
        assert!(!AppError::InsufficientData(1).is_not_found());
        assert!(AppError::InsufficientData(1).is_insufficient_data());
        assert!(!AppError::Config("x".into()).is_insufficient_data());
    }
}
