//! Authorization flow initiation
//!
//! Builds the authorization URL and sends the user agent there. The PKCE
//! session is persisted before navigation; the redirect target is
//! recomputed from the current location so initiation and exchange always
//! agree.

use tracing::{debug, info};

use crate::constants::{SCOPES, VERIFIER_LENGTH};
use crate::error::{Error, Result};
use crate::navigator::Navigator;
use crate::pkce;
use crate::store::{CredentialStore, PkceSession};

/// Build the full authorization URL with all required OAuth parameters.
///
/// The `state` parameter is an opaque value the client generates for CSRF
/// protection; the authorization server returns it unchanged in the
/// callback.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&scope={}&redirect_uri={}&code_challenge_method=S256&code_challenge={}&state={}",
        authorize_endpoint,
        urlencoding::encode(client_id),
        urlencoding::encode(SCOPES),
        urlencoding::encode(redirect_uri),
        challenge,
        state,
    )
}

/// Start the authorization flow: generate a PKCE session, persist it, and
/// navigate the user agent to the authorization endpoint.
///
/// Fails with [`Error::MissingClientId`] before any side effect when no
/// client identifier is configured, and with [`Error::EntropyUnavailable`]
/// when no secure randomness source exists. Does not return meaningfully
/// on success — the navigation leaves the page.
pub fn initiate_auth(
    store: &CredentialStore,
    navigator: &dyn Navigator,
    authorize_endpoint: &str,
    client_id: Option<&str>,
) -> Result<()> {
    let client_id = client_id.ok_or(Error::MissingClientId)?;

    let verifier = pkce::generate_verifier(VERIFIER_LENGTH)?;
    let challenge = pkce::compute_challenge(&verifier);
    let state = pkce::generate_state()?;
    store.store_pkce(&PkceSession {
        verifier,
        state: state.clone(),
    });

    let redirect_uri = navigator.location().redirect_uri();
    let url = build_authorization_url(authorize_endpoint, client_id, &redirect_uri, &challenge, &state);
    debug!(redirect_uri, "initiating authorization flow");
    navigator.navigate(&url);
    info!("navigated to authorization endpoint");
    Ok(())
}
