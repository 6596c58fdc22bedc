//! Unified error types for the market engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for MarketError {
    fn from(err: rusqlite::Error) -> Self {
        MarketError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
