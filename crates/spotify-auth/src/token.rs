//! OAuth token exchange, refresh, and the token accessor
//!
//! The raw endpoint helpers ([`exchange_code`], [`refresh_token`]) POST
//! form-encoded grants to the token endpoint and surface errors as
//! [`Error`]. [`TokenManager`] layers the lifecycle rules on top: refresh
//! that never mutates the store on failure, and a hot-path accessor that
//! only touches the network when the stored token is inside its expiry
//! margin.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::EXPIRY_MARGIN;
use crate::error::{Error, Result};
use crate::store::{Credential, CredentialStore, expires_at_from};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// converts it to an absolute unix millisecond timestamp when storing the
/// credential, assuming 3600 when absent. `refresh_token` is optional on
/// refresh responses — rotation is per-provider.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: Option<u64>,
}

/// Exchange an authorization code for tokens (initial flow completion).
///
/// `redirect_uri` must match the one sent at authorization time
/// byte-for-byte; the verifier proves we initiated the flow.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// 401/403 means the refresh token is revoked or invalid; everything else
/// non-success is a plain exchange failure.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Token lifecycle manager: refresher + accessor over an injected store.
///
/// Safe to invoke concurrently: each call performs its own exchange and
/// the store reflects whichever write lands last. Callers that need the
/// authoritative value read the store afterward.
#[derive(Clone)]
pub struct TokenManager {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: Option<String>,
    store: CredentialStore,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: Option<String>,
        store: CredentialStore,
    ) -> Self {
        Self {
            http,
            token_endpoint: token_endpoint.into(),
            client_id,
            store,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `None` immediately when no refresh token (or client id) is
    /// stored, and on any endpoint failure — without mutating stored
    /// state. On success the credential is overwritten in place; a rotated
    /// refresh token is applied when the response carries one, otherwise
    /// the existing refresh token is retained.
    pub async fn refresh(&self) -> Option<Credential> {
        let client_id = self.client_id.as_deref()?;
        let refresh = self.store.refresh_token_value()?;

        match refresh_token(&self.http, &self.token_endpoint, client_id, &refresh).await {
            Ok(response) => {
                let credential = Credential {
                    access_token: response.access_token,
                    refresh_token: response.refresh_token.or(Some(refresh)),
                    expires_at: expires_at_from(response.expires_in),
                };
                self.store.store_credential(&credential);
                debug!("token refresh succeeded");
                Some(credential)
            }
            Err(Error::InvalidCredentials(msg)) => {
                warn!(error = %msg, "refresh token rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                None
            }
        }
    }

    /// A currently-valid access token, or the best available fallback.
    ///
    /// Hot path: when the stored token has more than the 60-second safety
    /// margin left, it is returned directly with no network call.
    /// Otherwise exactly one refresh is attempted; on refresh failure the
    /// stored token is returned as-is (callers discover staleness via a
    /// subsequent 401), or `None` when nothing is stored. Never errors.
    pub async fn valid_token(&self) -> Option<String> {
        if let Some(credential) = self.store.credential() {
            if credential.is_fresh(EXPIRY_MARGIN) {
                return Some(credential.access_token);
            }
        }

        match self.refresh().await {
            Some(credential) => Some(credential.access_token),
            None => self.store.credential().map(|c| c.access_token),
        }
    }
}
