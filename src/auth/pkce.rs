//! PKCE (Proof Key for Code Exchange) utilities for OAuth2
//!
//! Implements RFC 7636 for secure authorization code exchange.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the code verifier (must be 43-128 characters)
const CODE_VERIFIER_LENGTH: usize = 64;

/// Length of the CSRF `state` value
const STATE_LENGTH: usize = 32;

/// Characters allowed in code verifier (unreserved URI characters per RFC 7636)
const VERIFIER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// How the code challenge is derived from the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PkceMethod {
    /// BASE64URL(SHA256(verifier))
    #[default]
    S256,
    /// challenge == verifier; only for providers that cannot do S256
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    /// Value of the `code_challenge_method` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }
}

/// Generate a cryptographically random code verifier
///
/// The code verifier is a high-entropy random string between 43-128 characters
/// using unreserved URI characters as defined in RFC 7636.
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_VERIFIER_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..VERIFIER_CHARSET.len());
            VERIFIER_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a code challenge from the code verifier
///
/// Uses S256 method: BASE64URL(SHA256(code_verifier))
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random state string for CSRF protection
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    (0..STATE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// PKCE pair containing both verifier and challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
    pub method: PkceMethod,
}

impl PkcePair {
    /// Generate a new S256 PKCE pair
    pub fn new() -> Self {
        Self::with_method(PkceMethod::S256)
    }

    /// Generate a new PKCE pair using the given challenge method
    pub fn with_method(method: PkceMethod) -> Self {
        let verifier = generate_code_verifier();
        let challenge = match method {
            PkceMethod::S256 => generate_code_challenge(&verifier),
            PkceMethod::Plain => verifier.clone(),
        };
        Self { verifier, challenge, method }
    }
}

impl Default for PkcePair {
    fn default() -> Self {
        Self::new()
    }
}
