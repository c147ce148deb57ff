//! Error types and conversions
//!
//! The taxonomy separates errors the caller can fix before any I/O
//! (`Configuration`), recoverable callback conditions (`NoPendingRequest`),
//! security failures (`StateMismatch`), and the three failure modes of a
//! token-endpoint exchange (`Transport`, `Protocol`, `TokenExchange`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// A required field is missing or invalid. Raised synchronously, before
    /// any network request is made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A callback arrived but no authorization request is pending. Expected
    /// on direct navigation, replay, or a second tab; recoverable.
    #[error("no authorization request is pending")]
    NoPendingRequest,

    /// The callback's `state` does not match the pending request's `state`.
    /// The flow is aborted and no token exchange is attempted.
    #[error("authorization callback state does not match the pending request")]
    StateMismatch,

    /// `begin` was called while a capture was already awaiting its callback.
    #[error("an authorization request is already in progress")]
    AlreadyInProgress,

    /// The authorization server denied the request (e.g. `access_denied`).
    #[error("authorization error: {error}")]
    Authorization {
        error: String,
        description: Option<String>,
    },

    /// Network-level failure contacting an endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// A success response that does not conform to the protocol (e.g. a 2xx
    /// token response without `access_token`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server-reported token endpoint error (`error`/`error_description`).
    #[error("token request failed: {kind}")]
    TokenExchange {
        kind: String,
        description: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for String {
    fn from(err: AuthError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_exchange_display() {
        let err = AuthError::TokenExchange {
            kind: "invalid_grant".to_string(),
            description: Some("expired".to_string()),
        };
        assert_eq!(err.to_string(), "token request failed: invalid_grant");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: AuthError = io.into();
        assert!(matches!(err, AuthError::Io(_)));
    }
}
