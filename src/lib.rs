//! xsignin - "Sign in with X" OAuth client
//!
//! This library signs OAuth 1.0a requests with HMAC-SHA1, runs the
//! three-legged and OAuth 2.0 PKCE sign-in flows, and keeps the signed-in
//! identity for a fixed 24 hour window.

pub mod auth;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{AuthErrorKind, Error, Result};
