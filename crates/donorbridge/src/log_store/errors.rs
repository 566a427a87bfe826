use sea_orm::DbErr;
use thiserror::Error;

/// Errors that can occur during sync log operations.
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Rendering the CSV export failed.
    #[error("Export failed: {message}")]
    Export { message: String },
}

impl LogStoreError {
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }
}

impl From<csv::Error> for LogStoreError {
    fn from(e: csv::Error) -> Self {
        Self::export(e.to_string())
    }
}

/// Result type alias for sync log operations.
pub type Result<T> = std::result::Result<T, LogStoreError>;
