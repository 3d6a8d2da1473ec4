//! Error types for xsignin

use thiserror::Error;

/// Result type alias for xsignin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed sign-in step.
///
/// The kind is what callers branch on and what gets logged; the message
/// attached to [`Error::Auth`] is for humans only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// Transport-level failure (DNS, connect, reset)
    NetworkFailure,
    /// Provider answered with a non-2xx status
    ProviderRejected,
    /// Provider rejected the OAuth 1.0a signature (bad secret or clock skew)
    SignatureRejected,
    /// Callback `state` / `oauth_token` did not match the value we issued
    StateMismatch,
    /// Access token expired or revoked
    Unauthorized,
    /// A network step or the callback wait exceeded its deadline
    Timeout,
    /// Provider did not confirm the OAuth 1.0a callback URL
    CallbackNotConfirmed,
    /// Another sign-in attempt is already outstanding
    AlreadyInProgress,
    /// Provider response could not be parsed
    MalformedResponse,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::NetworkFailure => "network_failure",
            AuthErrorKind::ProviderRejected => "provider_rejected",
            AuthErrorKind::SignatureRejected => "signature_rejected",
            AuthErrorKind::StateMismatch => "state_mismatch",
            AuthErrorKind::Unauthorized => "unauthorized",
            AuthErrorKind::Timeout => "timeout",
            AuthErrorKind::CallbackNotConfirmed => "callback_not_confirmed",
            AuthErrorKind::AlreadyInProgress => "already_in_progress",
            AuthErrorKind::MalformedResponse => "malformed_response",
        }
    }

    /// Whether the same step may be attempted again.
    ///
    /// Signature rejections are retryable only after a fresh nonce and
    /// timestamp have been generated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthErrorKind::NetworkFailure
                | AuthErrorKind::Timeout
                | AuthErrorKind::SignatureRejected
        )
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in xsignin
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error ({kind}): {message}")]
    Auth {
        kind: AuthErrorKind,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::Auth`] of the given kind
    pub fn auth(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Error::Auth {
            kind,
            message: message.into(),
        }
    }

    /// The auth error kind, if this is an auth failure
    pub fn kind(&self) -> Option<AuthErrorKind> {
        match self {
            Error::Auth { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
