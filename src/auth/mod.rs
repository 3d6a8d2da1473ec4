//! Authentication module for "sign in with X"
//!
//! This module provides:
//! - OAuth 1.0a HMAC-SHA1 request signing and the three-legged token flow
//! - OAuth 2.0 authorization code flow with PKCE
//! - Callback parsing and a one-shot local callback server
//! - Session persistence with a fixed 24 hour window
//! - [`Authenticator`] tying a configured [`AuthFlow`] to the session store

mod http;
mod identity;
mod pkce;
mod store;
mod flow;
pub mod percent;
pub mod signature;
pub mod oauth1;
pub mod oauth2;
pub mod callback;
pub mod callback_server;

pub use identity::UserIdentity;
pub use pkce::{PkceMethod, PkcePair, generate_code_challenge, generate_code_verifier, generate_state};
pub use store::{
    Clock, CredentialStore, FileSessionBackend, MemorySessionBackend, SessionBackend, SessionGate,
    StoredSession, SystemClock, SESSION_TTL_MS,
};
pub use flow::{AuthAttempt, AuthFlow, Authenticator, PendingAuth};
pub use callback::CallbackParams;
pub use signature::SignatureSigner;
