use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt {kind} row: {message}")]
    Corrupt { kind: &'static str, message: String },

    #[error("Ractor error: {0}")]
    Ractor(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
