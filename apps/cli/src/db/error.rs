//! Database error types.

use notecard_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlite(e) => StoreError::Backend(e.to_string()),
            DbError::Json(e) => StoreError::Corrupt(e.to_string()),
            DbError::InvalidData(msg) => StoreError::Corrupt(msg),
            DbError::NotFound { entity, id } => StoreError::not_found(entity, id),
        }
    }
}
