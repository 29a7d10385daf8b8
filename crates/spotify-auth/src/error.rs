//! Error types for OAuth authentication operations

/// Errors from OAuth authentication operations.
///
/// Only `initiate_auth` and the raw token-endpoint helpers surface these;
/// the callback exchanger and token accessor catch them internally and
/// degrade to `None` so nothing below the orchestrator throws outward.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No secure randomness source is available. Fatal to login, not retried.
    #[error("no secure entropy source available")]
    EntropyUnavailable,

    /// No client identifier configured. Must abort before navigating.
    #[error("no client id configured for the authorization flow")]
    MissingClientId,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Refresh token revoked or invalid (401/403 from the token endpoint).
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
