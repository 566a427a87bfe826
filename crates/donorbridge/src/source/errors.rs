use thiserror::Error;

/// Errors raised while reading from the donation source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached or timed out.
    #[error("Source unavailable: {message}")]
    Unavailable { message: String },

    /// The source returned data that could not be understood.
    #[error("Malformed source data: {message}")]
    Malformed { message: String },

    /// Reading a source export from disk failed.
    #[error("Failed to read source export: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Create an unavailable error.
    #[inline]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a malformed data error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether retrying the same call later may succeed. Unreachable and
    /// garbled responses are transport failures; a missing export is not.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Malformed { .. })
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e.to_string())
    }
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
