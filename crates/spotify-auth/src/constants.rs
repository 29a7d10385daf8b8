//! Spotify OAuth constants
//!
//! Public endpoint and scope configuration for the Authorization-Code-with-
//! PKCE flow. None of these are secrets — the client ID is deployment
//! configuration (a public client identifier), and the actual secrets
//! (access/refresh tokens) live in the credential store.

use std::time::Duration;

/// Authorization endpoint the user agent is sent to
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Base URL for resource API calls
pub const API_BASE: &str = "https://api.spotify.com/v1";

/// OAuth scopes requested at authorization time.
/// Profile + email for the account screen, top-items and recently-played
/// for listening statistics.
pub const SCOPES: &str = "user-read-private user-read-email user-top-read user-read-recently-played";

/// PKCE code verifier length in characters
pub const VERIFIER_LENGTH: usize = 64;

/// Anti-forgery state token length in characters
pub const STATE_LENGTH: usize = 16;

/// Access-token lifetime assumed when the token response omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Safety margin before expiry at which a token is no longer served
/// directly and a refresh is attempted instead.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Session storage keys. The store is keyed string storage; these are the
/// only keys this crate writes.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const TOKEN_EXPIRES_AT: &str = "token_expires_at";
    pub const CODE_VERIFIER: &str = "code_verifier";
    pub const AUTH_STATE: &str = "auth_state";
}
