//! Session-scoped credential storage
//!
//! [`SessionStore`] is the keyed string storage every auth component is
//! handed explicitly — nothing in this crate reaches for ambient global
//! state, so tests substitute an in-memory fake trivially. The store has
//! no transactional discipline beyond last-write-wins; overwriting with a
//! validly-issued newer credential is always safe.
//!
//! [`CredentialStore`] is the typed layer on top: it owns the key names
//! and the encoding (expiry as an epoch-millisecond string) so the rest of
//! the crate deals in [`Credential`] and [`PkceSession`] values.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::constants::{DEFAULT_EXPIRES_IN_SECS, keys};

/// Keyed string storage scoped to one interactive session.
///
/// Last write wins; single-writer-at-a-time in practice because the UI
/// drives one login/refresh flow interactively at a time.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
}

/// In-memory [`SessionStore`]. The session-scoped default (durability
/// across restarts is out of scope) and the fake used throughout tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// A stored OAuth credential.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a
/// delta), computed at storage time from the token response's `expires_in`
/// seconds delta plus the current time. Absence of an access token means
/// "no credential" — a credential with empty fields cannot exist.
#[derive(Clone)]
pub struct Credential {
    /// Current access token (Bearer token for API calls)
    pub access_token: String,
    /// Refresh token for minting new access tokens, when the provider
    /// issued one
    pub refresh_token: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
}

impl Credential {
    /// Whether the access token is still comfortably inside its lifetime,
    /// i.e. more than `margin` before `expires_at`.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        now_millis() + (margin.as_millis() as u64) < self.expires_at
    }
}

// Tokens are secrets; keep them out of Debug/log output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// In-flight PKCE artifacts, created at authorization-initiation time and
/// consumed exactly once by the callback exchanger.
#[derive(Clone)]
pub struct PkceSession {
    pub verifier: String,
    pub state: String,
}

impl fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceSession")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Typed credential access over an injected [`SessionStore`].
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn SessionStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// The stored credential, or `None` when no access token is present.
    /// An unparseable expiry reads as already expired rather than erroring.
    pub fn credential(&self) -> Option<Credential> {
        let access_token = self.store.get(keys::ACCESS_TOKEN).filter(|t| !t.is_empty())?;
        let expires_at = self
            .store
            .get(keys::TOKEN_EXPIRES_AT)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Some(Credential {
            access_token,
            refresh_token: self.refresh_token_value(),
            expires_at,
        })
    }

    /// The stored refresh token. Readable independently of the access
    /// token so a refresh can still run after the access token was
    /// dropped. An empty string reads as absent.
    pub fn refresh_token_value(&self) -> Option<String> {
        self.store.get(keys::REFRESH_TOKEN).filter(|t| !t.is_empty())
    }

    /// Overwrite the stored credential in place.
    pub fn store_credential(&self, credential: &Credential) {
        self.store.set(keys::ACCESS_TOKEN, &credential.access_token);
        self.store
            .set(keys::TOKEN_EXPIRES_AT, &credential.expires_at.to_string());
        if let Some(refresh) = &credential.refresh_token {
            self.store.set(keys::REFRESH_TOKEN, refresh);
        }
        debug!(expires_at = credential.expires_at, "stored credential");
    }

    /// Delete the credential wholesale (logout, unrecoverable failure).
    pub fn clear_credential(&self) {
        self.store.remove(keys::ACCESS_TOKEN);
        self.store.remove(keys::REFRESH_TOKEN);
        self.store.remove(keys::TOKEN_EXPIRES_AT);
        debug!("cleared credential");
    }

    /// Persist in-flight PKCE artifacts for one authorization round trip.
    pub fn store_pkce(&self, session: &PkceSession) {
        self.store.set(keys::CODE_VERIFIER, &session.verifier);
        self.store.set(keys::AUTH_STATE, &session.state);
    }

    /// Read and delete the PKCE session. The session never outlives one
    /// authorization round trip, so every read consumes it.
    pub fn take_pkce(&self) -> Option<PkceSession> {
        let verifier = self.store.get(keys::CODE_VERIFIER);
        let state = self.store.get(keys::AUTH_STATE);
        self.store.remove(keys::CODE_VERIFIER);
        self.store.remove(keys::AUTH_STATE);
        Some(PkceSession {
            verifier: verifier?,
            state: state?,
        })
    }

    /// Clear everything: credential and any PKCE remnants.
    pub fn clear_all(&self) {
        self.store.clear();
        debug!("cleared session store");
    }
}

/// Current time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Absolute expiry for a token response's declared lifetime, defaulting to
/// 3600 seconds when the response omits `expires_in`.
pub(crate) fn expires_at_from(expires_in: Option<u64>) -> u64 {
    now_millis() + expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS) * 1000
}
