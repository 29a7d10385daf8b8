//! Auth orchestrator state machine
//!
//! Drives one session from `Initializing` to a terminal `Authenticated` or
//! `Unauthenticated` state. The startup routine is sequential: a callback
//! code, when present, is exchanged to completion before any silent token
//! check would run, so the two never overlap.
//!
//! Suppression of stale completions uses an epoch counter plus a torn-down
//! flag: `logout()` and `teardown()` bump the epoch, and every transition
//! triggered by an asynchronous completion re-checks its epoch under the
//! state lock before writing. A response that settles after logout or
//! teardown updates nothing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use spotify_api::{ApiError, Artist, AudioFeatures, SpotifyClient, TimeRange, Track, User};
use spotify_auth::{
    CallbackParams, CredentialStore, Navigator, SessionStore, TokenManager, handle_callback,
    initiate_auth,
};

use crate::config::SessionConfig;

/// Result count requested for top-item fetches.
const TOP_ITEMS_LIMIT: u8 = 50;

/// Current authentication state. Exactly one is current at any time,
/// owned by the orchestrator and mutated only through its transitions.
#[derive(Clone, PartialEq)]
pub enum AuthState {
    Initializing,
    Authenticated {
        access_token: String,
        user: Option<User>,
    },
    Unauthenticated,
}

impl AuthState {
    /// State label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Initializing => "initializing",
            AuthState::Authenticated { .. } => "authenticated",
            AuthState::Unauthenticated => "unauthenticated",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

// The access token stays out of Debug output.
impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Initializing => f.write_str("Initializing"),
            AuthState::Unauthenticated => f.write_str("Unauthenticated"),
            AuthState::Authenticated { user, .. } => f
                .debug_struct("Authenticated")
                .field("access_token", &"[REDACTED]")
                .field("user", user)
                .finish(),
        }
    }
}

/// Aggregated listening statistics for downstream feature code (the
/// personality screen consumes these; scoring itself lives elsewhere).
#[derive(Debug, Clone)]
pub struct ListeningData {
    pub artists: Vec<Artist>,
    pub tracks: Vec<Track>,
    pub features: Vec<AudioFeatures>,
}

/// State cell shared with spawned completion handlers. Transitions carry
/// the epoch they were started under; a bumped epoch or the torn-down
/// flag makes them no-ops.
struct Lifecycle {
    state: RwLock<AuthState>,
    epoch: AtomicU64,
    torn_down: AtomicBool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: RwLock::new(AuthState::Initializing),
            epoch: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn supersede(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn superseded(&self, epoch: u64) -> bool {
        self.torn_down.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch
    }

    /// Apply `next` unless this epoch was superseded. Re-checked under
    /// the state lock so a logout racing a completion can never be
    /// overwritten.
    async fn transition(&self, epoch: u64, next: AuthState) -> bool {
        if self.superseded(epoch) {
            debug!(state = next.label(), "discarding stale transition");
            return false;
        }
        let mut state = self.state.write().await;
        if self.superseded(epoch) {
            debug!(state = next.label(), "discarding stale transition");
            return false;
        }
        info!(from = state.label(), to = next.label(), "auth state transition");
        *state = next;
        true
    }
}

/// Top-level coordinator the UI layer talks to.
pub struct Orchestrator {
    config: SessionConfig,
    store: CredentialStore,
    tokens: TokenManager,
    api: SpotifyClient,
    navigator: Arc<dyn Navigator>,
    http: reqwest::Client,
    lifecycle: Arc<Lifecycle>,
}

impl Orchestrator {
    pub fn new(
        config: SessionConfig,
        session_store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let http = reqwest::Client::new();
        let store = CredentialStore::new(session_store);
        let tokens = TokenManager::new(
            http.clone(),
            config.token_endpoint.clone(),
            config.client_id.clone(),
            store.clone(),
        );
        let api = SpotifyClient::new(http.clone(), config.api_base.clone(), tokens.clone());
        Self {
            config,
            store,
            tokens,
            api,
            navigator,
            http,
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> AuthState {
        self.lifecycle.state.read().await.clone()
    }

    /// Run the startup routine: exchange a callback code when one is
    /// present in the location, otherwise race the silent token check
    /// against the startup timeout. Terminal state is `Authenticated` or
    /// `Unauthenticated`; an authenticated outcome schedules the
    /// user-profile fetch.
    pub async fn start(&self) {
        let epoch = self.lifecycle.epoch();
        let location = self.navigator.location();
        let params = CallbackParams::parse(&location.query);

        if params.has_code() {
            // A one-shot user-initiated exchange: not raced against the
            // startup timeout.
            let token = handle_callback(
                &self.http,
                &self.config.token_endpoint,
                self.config.client_id.as_deref(),
                &self.store,
                self.navigator.as_ref(),
            )
            .await;
            match token {
                Some(token) => self.authenticated(epoch, token).await,
                None => {
                    self.lifecycle.transition(epoch, AuthState::Unauthenticated).await;
                }
            }
            return;
        }

        match timeout(self.config.startup_timeout, self.tokens.valid_token()).await {
            Ok(Some(token)) => self.authenticated(epoch, token).await,
            Ok(None) => {
                self.lifecycle.transition(epoch, AuthState::Unauthenticated).await;
            }
            Err(_) => {
                // Indistinguishable from "not logged in" to the user; the
                // abandoned check's eventual outcome is discarded.
                warn!(
                    timeout_ms = self.config.startup_timeout.as_millis() as u64,
                    "silent token check timed out, forcing unauthenticated"
                );
                self.lifecycle.transition(epoch, AuthState::Unauthenticated).await;
            }
        }
    }

    async fn authenticated(&self, epoch: u64, token: String) {
        let entered = self
            .lifecycle
            .transition(
                epoch,
                AuthState::Authenticated {
                    access_token: token.clone(),
                    user: None,
                },
            )
            .await;
        if entered {
            self.spawn_profile_fetch(epoch, token);
        }
    }

    /// Fetch the user profile under its own, shorter timeout. A session
    /// that cannot produce a user record in time is not a valid terminal
    /// condition: the credential is discarded and the state forced
    /// unauthenticated.
    fn spawn_profile_fetch(&self, epoch: u64, token: String) {
        let lifecycle = self.lifecycle.clone();
        let api = self.api.clone();
        let store = self.store.clone();
        let window = self.config.profile_timeout;
        tokio::spawn(async move {
            match timeout(window, api.current_user(&token)).await {
                Ok(Ok(user)) => {
                    debug!(user_id = %user.id, "user profile fetched");
                    lifecycle
                        .transition(
                            epoch,
                            AuthState::Authenticated {
                                access_token: token,
                                user: Some(user),
                            },
                        )
                        .await;
                }
                Ok(Err(ApiError::SessionExpired)) => {
                    warn!("profile fetch found the session expired, discarding credential");
                    if lifecycle.transition(epoch, AuthState::Unauthenticated).await {
                        store.clear_credential();
                    }
                }
                Ok(Err(e)) => {
                    // Leave the session usable; the user record stays absent.
                    warn!(error = %e, "user profile fetch failed");
                }
                Err(_) => {
                    warn!(
                        timeout_ms = window.as_millis() as u64,
                        "user profile fetch timed out, discarding credential"
                    );
                    if lifecycle.transition(epoch, AuthState::Unauthenticated).await {
                        store.clear_credential();
                    }
                }
            }
        });
    }

    /// Begin the authorization flow. Fails with `MissingClientId` before
    /// any navigation when the deployment provides no client identifier.
    pub fn login(&self) -> spotify_auth::Result<()> {
        initiate_auth(
            &self.store,
            self.navigator.as_ref(),
            &self.config.authorize_endpoint,
            self.config.client_id.as_deref(),
        )
    }

    /// Clear all stored credentials and PKCE remnants and transition to
    /// `Unauthenticated`, independent of any in-flight operation.
    /// In-flight completions observe the bumped epoch and are discarded.
    pub async fn logout(&self) {
        self.lifecycle.supersede();
        self.store.clear_all();
        let mut state = self.lifecycle.state.write().await;
        *state = AuthState::Unauthenticated;
        info!("logged out");
    }

    /// Tear the orchestrator down (e.g. the hosting UI unmounts). No
    /// asynchronous completion mutates state afterwards.
    pub fn teardown(&self) {
        self.lifecycle.torn_down.store(true, Ordering::SeqCst);
        self.lifecycle.supersede();
        debug!("orchestrator torn down");
    }

    /// Aggregate listening statistics: top artists and tracks fetched
    /// concurrently, then audio features for the returned tracks. Errors
    /// surface to the caller — this is feature-code territory, not a
    /// state transition.
    pub async fn load_listening_data(&self) -> Result<ListeningData, ApiError> {
        let token = self
            .tokens
            .valid_token()
            .await
            .ok_or(ApiError::SessionExpired)?;

        let (artists, tracks) = tokio::try_join!(
            self.api.top_artists(&token, TimeRange::MediumTerm, TOP_ITEMS_LIMIT),
            self.api.top_tracks(&token, TimeRange::MediumTerm, TOP_ITEMS_LIMIT),
        )?;
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let features = self.api.audio_features(&token, &ids).await?;
        Ok(ListeningData {
            artists,
            tracks,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotify_auth::{Credential, Location, MemoryNavigator, MemoryStore, PkceSession};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    #[derive(Clone)]
    struct ProviderState {
        token_delay: Duration,
        me_delay: Duration,
        me_status: StatusCode,
        token_calls: Arc<AtomicUsize>,
        me_calls: Arc<AtomicUsize>,
    }

    struct MockProvider {
        base: String,
        token_calls: Arc<AtomicUsize>,
        me_calls: Arc<AtomicUsize>,
    }

    async fn token_endpoint(State(s): State<ProviderState>) -> Json<serde_json::Value> {
        s.token_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(s.token_delay).await;
        Json(serde_json::json!({
            "access_token": "at_minted",
            "refresh_token": "rt_next",
            "expires_in": 3600,
        }))
    }

    async fn me_endpoint(State(s): State<ProviderState>) -> axum::response::Response {
        s.me_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(s.me_delay).await;
        if s.me_status == StatusCode::OK {
            Json(serde_json::json!({"id": "user-1", "display_name": "Tester"})).into_response()
        } else {
            s.me_status.into_response()
        }
    }

    async fn mock_provider(
        token_delay: Duration,
        me_delay: Duration,
        me_status: StatusCode,
    ) -> MockProvider {
        let state = ProviderState {
            token_delay,
            me_delay,
            me_status,
            token_calls: Arc::new(AtomicUsize::new(0)),
            me_calls: Arc::new(AtomicUsize::new(0)),
        };
        let token_calls = state.token_calls.clone();
        let me_calls = state.me_calls.clone();
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .route("/me", get(me_endpoint))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockProvider {
            base: format!("http://{addr}"),
            token_calls,
            me_calls,
        }
    }

    fn test_config(base: &str) -> SessionConfig {
        SessionConfig {
            client_id: Some("client-id".into()),
            authorize_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            api_base: base.to_string(),
            startup_timeout: Duration::from_millis(500),
            profile_timeout: Duration::from_millis(500),
        }
    }

    fn build(
        config: SessionConfig,
        query: &str,
    ) -> (Orchestrator, CredentialStore, Arc<MemoryNavigator>) {
        let session = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(session.clone());
        let navigator = Arc::new(MemoryNavigator::new(Location::new(
            "https://app", "/", query,
        )));
        let orchestrator = Orchestrator::new(config, session, navigator.clone());
        (orchestrator, store, navigator)
    }

    fn fresh_credential() -> Credential {
        Credential {
            access_token: "at_fresh".into(),
            refresh_token: Some("rt_stored".into()),
            expires_at: u64::MAX,
        }
    }

    fn stale_credential() -> Credential {
        Credential {
            access_token: "at_stale".into(),
            refresh_token: Some("rt_stored".into()),
            expires_at: 0,
        }
    }

    async fn wait_until(
        orchestrator: &Orchestrator,
        what: &str,
        predicate: impl Fn(&AuthState) -> bool,
    ) -> AuthState {
        for _ in 0..200 {
            let state = orchestrator.state().await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {what}, last state: {:?}",
            orchestrator.state().await
        );
    }

    #[tokio::test]
    async fn no_credential_and_no_code_settles_unauthenticated() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let (orchestrator, _, _) = build(test_config(&provider.base), "");

        orchestrator.start().await;

        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);
        assert_eq!(provider.token_calls.load(Ordering::SeqCst), 0, "no network calls");
        assert_eq!(provider.me_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_credential_settles_authenticated_with_one_profile_fetch() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "");
        store.store_credential(&fresh_credential());

        orchestrator.start().await;

        let state = wait_until(&orchestrator, "profile fetch", |s| {
            matches!(s, AuthState::Authenticated { user: Some(_), .. })
        })
        .await;
        match state {
            AuthState::Authenticated { access_token, user } => {
                assert_eq!(access_token, "at_fresh", "the stored token, no refresh");
                assert_eq!(user.unwrap().id, "user-1");
            }
            other => panic!("expected authenticated, got {other:?}"),
        }
        assert_eq!(provider.token_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.me_calls.load(Ordering::SeqCst), 1, "exactly one profile fetch");
    }

    #[tokio::test]
    async fn callback_with_mismatched_state_settles_unauthenticated() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "code=abc&state=forged");
        store.store_pkce(&PkceSession {
            verifier: "v".into(),
            state: "state-xyz".into(),
        });

        orchestrator.start().await;

        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);
        assert_eq!(provider.token_calls.load(Ordering::SeqCst), 0, "no token request issued");
        assert!(store.take_pkce().is_none(), "PKCE artifacts cleared");
    }

    #[tokio::test]
    async fn callback_success_authenticates_and_strips_query() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let (orchestrator, store, navigator) =
            build(test_config(&provider.base), "code=good&state=state-xyz");
        store.store_pkce(&PkceSession {
            verifier: "v".into(),
            state: "state-xyz".into(),
        });

        orchestrator.start().await;

        let state = wait_until(&orchestrator, "profile fetch", |s| {
            matches!(s, AuthState::Authenticated { user: Some(_), .. })
        })
        .await;
        assert!(state.is_authenticated());
        assert_eq!(provider.token_calls.load(Ordering::SeqCst), 1);
        assert_eq!(navigator.location().query, "", "spent code stripped");
        assert_eq!(store.credential().unwrap().access_token, "at_minted");
    }

    #[tokio::test]
    async fn hung_token_check_is_forced_unauthenticated_and_stays_there() {
        // Refresh takes 2s; the startup window is 100ms
        let provider = mock_provider(Duration::from_secs(2), Duration::ZERO, StatusCode::OK).await;
        let mut config = test_config(&provider.base);
        config.startup_timeout = Duration::from_millis(100);
        let (orchestrator, store, _) = build(config, "");
        store.store_credential(&stale_credential());

        orchestrator.start().await;
        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);

        // The abandoned call's eventual outcome must not flip state back
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn logout_during_profile_fetch_is_not_reverted() {
        let provider = mock_provider(Duration::ZERO, Duration::from_millis(300), StatusCode::OK).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "");
        store.store_credential(&fresh_credential());

        orchestrator.start().await;
        wait_until(&orchestrator, "authenticated", |s| s.is_authenticated()).await;

        orchestrator.logout().await;
        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);
        assert!(store.credential().is_none());

        // Let the in-flight fetch settle; its completion must update nothing
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(orchestrator.state().await, AuthState::Unauthenticated);
        assert_eq!(provider.me_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn teardown_suppresses_pending_completions() {
        let provider = mock_provider(Duration::ZERO, Duration::from_millis(300), StatusCode::OK).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "");
        store.store_credential(&fresh_credential());

        orchestrator.start().await;
        wait_until(&orchestrator, "authenticated", |s| s.is_authenticated()).await;
        orchestrator.teardown();

        tokio::time::sleep(Duration::from_millis(500)).await;
        match orchestrator.state().await {
            AuthState::Authenticated { user, .. } => {
                assert!(user.is_none(), "fetch completion after teardown must not land");
            }
            other => panic!("teardown must freeze the state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn profile_fetch_timeout_discards_the_credential() {
        let provider = mock_provider(Duration::ZERO, Duration::from_millis(400), StatusCode::OK).await;
        let mut config = test_config(&provider.base);
        config.profile_timeout = Duration::from_millis(100);
        let (orchestrator, store, _) = build(config, "");
        store.store_credential(&fresh_credential());

        orchestrator.start().await;
        wait_until(&orchestrator, "forced unauthenticated", |s| {
            *s == AuthState::Unauthenticated
        })
        .await;
        assert!(store.credential().is_none(), "stale credential discarded");
    }

    #[tokio::test]
    async fn expired_session_during_profile_fetch_discards_the_credential() {
        // `/me` rejects every token and no refresh token is stored, so the
        // fetch surfaces a double-401 expiry rather than a timeout
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::UNAUTHORIZED).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "");
        store.store_credential(&Credential {
            access_token: "at_fresh".into(),
            refresh_token: None,
            expires_at: u64::MAX,
        });

        orchestrator.start().await;
        wait_until(&orchestrator, "forced unauthenticated", |s| {
            *s == AuthState::Unauthenticated
        })
        .await;

        assert!(store.credential().is_none(), "expired session clears the credential");
        assert_eq!(
            provider.token_calls.load(Ordering::SeqCst),
            0,
            "nothing to refresh with"
        );
        assert_eq!(provider.me_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_profile_fetch_keeps_the_session_without_a_user() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::INTERNAL_SERVER_ERROR).await;
        let (orchestrator, store, _) = build(test_config(&provider.base), "");
        store.store_credential(&fresh_credential());

        orchestrator.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        match orchestrator.state().await {
            AuthState::Authenticated { user, .. } => assert!(user.is_none()),
            other => panic!("expected authenticated without user, got {other:?}"),
        }
        assert!(store.credential().is_some(), "non-auth failures keep the credential");
    }

    #[tokio::test]
    async fn login_without_client_id_fails_before_navigating() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let mut config = test_config(&provider.base);
        config.client_id = None;
        let (orchestrator, _, navigator) = build(config, "");

        let err = orchestrator.login().unwrap_err();
        assert!(matches!(err, spotify_auth::Error::MissingClientId));
        assert_eq!(navigator.navigation_count(), 0);
    }

    #[tokio::test]
    async fn login_persists_pkce_and_navigates_to_authorize() {
        let provider = mock_provider(Duration::ZERO, Duration::ZERO, StatusCode::OK).await;
        let (orchestrator, store, navigator) = build(test_config(&provider.base), "");

        orchestrator.login().unwrap();

        let url = navigator.last_navigation().expect("navigated");
        assert!(url.starts_with(&format!("{}/authorize?", provider.base)));
        assert!(store.take_pkce().is_some());
    }
}
