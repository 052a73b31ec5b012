use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("season average table is empty: {0}")]
    EmptySeasonTable(String),

    #[error("forecast source not configured: {0}")]
    NotConfigured(String),

    #[error("unknown forecast source: {0}")]
    UnknownSource(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
