use thiserror::Error;

/// Errors returned by a destination client.
///
/// `Network`, `Http` and `Malformed` are transport failures: the request may
/// never have been processed and retrying later can succeed. `Api` and `Auth`
/// are answers from the destination itself.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// Connection failure or timeout.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-2xx HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("Malformed response: {message}")]
    Malformed { message: String },

    /// The destination rejected the request (unknown code, bad field, ...).
    #[error("API error: {message}")]
    Api { message: String },

    /// Credentials missing or rejected.
    #[error("Authentication failed: {message}")]
    Auth { message: String },
}

impl DestinationError {
    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an HTTP status error.
    #[inline]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a malformed response error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an API error.
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Check if this is a transport failure (retryable).
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Http { .. } | Self::Malformed { .. }
        )
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps multi-line API
/// error bodies out of progress output and log rows.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for destination operations.
pub type Result<T> = std::result::Result<T, DestinationError>;
