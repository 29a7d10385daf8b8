//! Authenticated API client with bounded 401 retry
//!
//! One retry, implemented as a loop rather than a recursive self-call, so
//! a misbehaving upstream that 401s forever cannot recurse unboundedly.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use spotify_auth::TokenManager;

use crate::error::{ApiError, Result};
use crate::models::{Artist, AudioFeatures, AudioFeaturesPage, Paging, TimeRange, Track, User};

/// Ids accepted by `/audio-features` in a single call. Beyond this the
/// input is truncated, never split — batching is a caller concern.
const AUDIO_FEATURES_MAX_IDS: usize = 100;

/// Typed client over the resource API.
#[derive(Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, tokens: TokenManager) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
        }
    }

    /// Authenticated GET with at most one refresh-and-retry on 401.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, token: &str) -> Result<T> {
        let mut token = token.to_string();
        let mut refreshed = false;

        loop {
            let response = self
                .http
                .get(format!("{}{}", self.base_url, endpoint))
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| ApiError::Http(format!("request to {endpoint} failed: {e}")))?;

            let status = response.status();
            if status.as_u16() == 401 {
                if refreshed {
                    warn!(endpoint, "401 after refresh, session expired");
                    return Err(ApiError::SessionExpired);
                }
                refreshed = true;
                debug!(endpoint, "401, refreshing token and retrying once");
                match self.tokens.refresh().await {
                    Some(credential) => {
                        token = credential.access_token;
                        continue;
                    }
                    None => return Err(ApiError::SessionExpired),
                }
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Api {
                    status: status.as_u16(),
                    message: provider_message(&body, status.as_u16()),
                });
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Decode(format!("decoding {endpoint} response: {e}")));
        }
    }

    /// Current user profile.
    pub async fn current_user(&self, token: &str) -> Result<User> {
        self.get("/me", token).await
    }

    /// Top artists over `range`, up to `limit` results.
    pub async fn top_artists(&self, token: &str, range: TimeRange, limit: u8) -> Result<Vec<Artist>> {
        let page: Paging<Artist> = self
            .get(
                &format!("/me/top/artists?time_range={}&limit={limit}", range.as_str()),
                token,
            )
            .await?;
        Ok(page.items)
    }

    /// Top tracks over `range`, up to `limit` results.
    pub async fn top_tracks(&self, token: &str, range: TimeRange, limit: u8) -> Result<Vec<Track>> {
        let page: Paging<Track> = self
            .get(
                &format!("/me/top/tracks?time_range={}&limit={limit}", range.as_str()),
                token,
            )
            .await?;
        Ok(page.items)
    }

    /// Batched audio features for up to 100 track ids; excess ids are
    /// truncated and null entries (unknown ids) are filtered out.
    pub async fn audio_features(&self, token: &str, ids: &[String]) -> Result<Vec<AudioFeatures>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .take(AUDIO_FEATURES_MAX_IDS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let page: AudioFeaturesPage = self
            .get(&format!("/audio-features?ids={joined}"), token)
            .await?;
        Ok(page.audio_features.into_iter().flatten().collect())
    }
}

/// Best available error message: the provider's `error.message` when the
/// body parses, else the HTTP status.
fn provider_message(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("API error: {status}"))
}
