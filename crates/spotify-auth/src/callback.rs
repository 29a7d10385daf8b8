//! Authorization callback validation and code exchange
//!
//! The provider redirects the user agent back with `code` + `state` (or an
//! `error`). Every outcome here maps to `Option<String>` — callers treat
//! `None` uniformly as "could not authenticate, show login". The PKCE
//! session is consumed exactly once per callback, success or failure, so a
//! replayed or forged callback finds nothing to exchange with.

use tracing::{debug, info, warn};

use crate::navigator::Navigator;
use crate::store::{Credential, CredentialStore, expires_at_from};
use crate::token;

/// Query parameters of an authorization callback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string (no leading `?`). Percent-decoded;
    /// undecodable values are kept verbatim rather than dropped.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Whether the query carries an authorization code at all. Used by the
    /// orchestrator to pick the callback path over the silent token check.
    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }
}

/// Validate the callback and exchange the authorization code for tokens.
///
/// Returns the new access token on success (the credential is stored as a
/// side effect) and `None` on any rejection: provider-reported error,
/// state mismatch, missing code or verifier, or a failed exchange. Never
/// propagates an error outward.
pub async fn handle_callback(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: Option<&str>,
    store: &CredentialStore,
    navigator: &dyn Navigator,
) -> Option<String> {
    let location = navigator.location();
    let params = CallbackParams::parse(&location.query);

    // Consumed up front: the session never survives a callback attempt,
    // so even rejected callbacks leave no replayable artifacts behind.
    let session = store.take_pkce();

    if let Some(error) = params.error {
        debug!(error, "provider reported an authorization error");
        return None;
    }

    let session = session?;
    let code = params.code?;
    if params.state.as_deref() != Some(session.state.as_str()) {
        warn!("callback state mismatch, rejecting");
        return None;
    }

    let client_id = client_id?;
    let redirect_uri = location.redirect_uri();
    let response = match token::exchange_code(
        http,
        token_endpoint,
        client_id,
        &code,
        &session.verifier,
        &redirect_uri,
    )
    .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "code exchange failed");
            return None;
        }
    };

    let credential = Credential {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at: expires_at_from(response.expires_in),
    };
    store.store_credential(&credential);

    // The code in the visible location is spent; a reload must not
    // re-submit it.
    navigator.strip_query();
    info!("authorization code exchanged");
    Some(credential.access_token)
}
