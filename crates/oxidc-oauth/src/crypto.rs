//! PKCE (Proof Key for Code Exchange) and state-token generation
//!
//! Implements PKCE as defined in RFC 7636 with the S256 (SHA-256) challenge
//! method, and the random `state` parameter used for CSRF protection.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters allowed in a PKCE code verifier (RFC 7636 "unreserved").
const VERIFIER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of generated code verifiers. RFC 7636 allows 43-128 characters.
const VERIFIER_LEN: usize = 64;

/// Length of generated state tokens. 32 characters from a 66-character
/// alphabet is roughly 190 bits of entropy.
const STATE_LEN: usize = 32;

/// PKCE verifier/challenge pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkcePair {
    /// Code verifier (random string, 43-128 characters)
    pub verifier: String,

    /// Code challenge (base64url(SHA256(verifier)), no padding)
    pub challenge: String,

    /// Challenge method (always "S256")
    pub method: String,
}

fn random_token(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..VERIFIER_CHARSET.len());
            VERIFIER_CHARSET[idx] as char
        })
        .collect()
}

/// Compute the S256 challenge for a code verifier.
///
/// The verifier-to-challenge mapping is deterministic: the same verifier
/// always yields the same challenge.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a fresh PKCE verifier/challenge pair.
///
/// The verifier is a 64-character random string from the RFC 7636 unreserved
/// set; the challenge is `base64url(SHA256(verifier))` without padding. The
/// verifier must never be sent to the authorization endpoint; it is presented
/// only at token-exchange time.
pub fn generate_pkce_pair() -> PkcePair {
    let verifier = random_token(VERIFIER_LEN);
    let challenge = challenge_for(&verifier);
    PkcePair {
        verifier,
        challenge,
        method: "S256".to_string(),
    }
}

/// Generate a random state token for CSRF protection.
///
/// Each call returns a fresh cryptographically random URL-safe string; the
/// caller stores it before redirecting and compares it against the `state`
/// echoed on the callback.
pub fn generate_state() -> String {
    random_token(STATE_LEN)
}
