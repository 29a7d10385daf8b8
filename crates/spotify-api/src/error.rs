//! Error types for API gateway calls

/// Errors surfaced to feature code issuing API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Two consecutive 401s, or a 401 followed by a failed refresh. The
    /// caller applies logout semantics.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Any other non-2xx response, with the provider's message when it
    /// was parseable.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;
