//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the OAuth
//! authorization flow. The verifier stays in the session store and is sent
//! during token exchange; the challenge is included in the authorization
//! URL so the authorization server can verify the exchange request came
//! from the same party that initiated the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::constants::{STATE_LENGTH, VERIFIER_LENGTH};
use crate::error::{Error, Result};

/// Characters allowed in verifiers and state tokens. A subset of the
/// RFC 3986 unreserved set, so values never need percent-encoding.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a cryptographically random PKCE code verifier.
///
/// `length` characters over the unreserved alphabet; RFC 7636 requires
/// 43-128. [`VERIFIER_LENGTH`] (64) is what the flow uses in practice.
///
/// Fails with [`Error::EntropyUnavailable`] only when the OS provides no
/// secure randomness source.
pub fn generate_verifier(length: usize) -> Result<String> {
    random_string(length)
}

/// Generate the anti-forgery state token round-tripped through the
/// authorization redirect. Independent of the verifier; used only for
/// CSRF-style validation of the callback.
pub fn generate_state() -> Result<String> {
    random_string(STATE_LENGTH)
}

fn random_string(length: usize) -> Result<String> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| Error::EntropyUnavailable)?;
    Ok(bytes
        .iter()
        .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
        .collect())
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`, padding stripped.
/// Deterministic given the verifier; the token endpoint later demands the
/// matching verifier from whoever presents the authorization code.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
