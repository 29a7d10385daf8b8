//! Spotify OAuth authentication library
//!
//! Provides PKCE flow generation, token exchange/refresh, and session-scoped
//! credential storage for the Authorization-Code-with-PKCE flow. This crate
//! is a standalone library with no dependency on the orchestrator — it can
//! be tested and used independently.
//!
//! Credential flow:
//! 1. `authorize::initiate_auth()` generates a PKCE session, persists it,
//!    and navigates the user agent to the authorization endpoint
//! 2. The provider redirects back with `code` + `state`
//! 3. `callback::handle_callback()` validates the redirect and exchanges
//!    the code for tokens via `token::exchange_code()`
//! 4. Tokens stored via `store::CredentialStore`
//! 5. `token::TokenManager::valid_token()` serves the access token,
//!    refreshing through `token::refresh_token()` when near expiry

pub mod authorize;
pub mod callback;
pub mod constants;
pub mod error;
pub mod navigator;
pub mod pkce;
pub mod store;
pub mod token;

pub use authorize::{build_authorization_url, initiate_auth};
pub use callback::{CallbackParams, handle_callback};
pub use error::{Error, Result};
pub use navigator::{Location, MemoryNavigator, Navigator};
pub use pkce::{compute_challenge, generate_state, generate_verifier};
pub use store::{Credential, CredentialStore, MemoryStore, PkceSession, SessionStore};
pub use token::{TokenManager, TokenResponse, exchange_code, refresh_token};
