use chrono::{DateTime, Utc};
use mailquote_core::ports::StoreError;
use thiserror::Error;

pub mod analysis;
pub mod correction;
pub mod memory;
pub mod source;

pub use analysis::SqlAnalysisRepository;
pub use correction::SqlCorrectionRepository;
pub use memory::{
    InMemoryAnalysisRepository, InMemoryCorrectionRepository, InMemorySourceRepository,
};
pub use source::SqlSourceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Backend(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

#[cfg(test)]
pub(crate) async fn setup_pool() -> crate::DbPool {
    let pool = crate::connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .expect("connect test pool");
    crate::migrations::run_pending(&pool).await.expect("run migrations");
    pool
}
