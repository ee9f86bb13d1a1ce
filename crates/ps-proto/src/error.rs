//! Error types for the protocol library.
//!
//! Frame parsing itself is total and never fails; these errors cover the
//! typed views layered on top of parsed events (query responses) and the
//! login handshake.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised when interpreting a parsed event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The event had a different type than the view expected.
    #[error("expected a `{expected}` event, got `{actual}`")]
    UnexpectedEvent {
        /// The event type the caller asked for.
        expected: &'static str,
        /// The event type actually received.
        actual: String,
    },

    /// A required positional field was missing.
    #[error("`{kind}` event is missing field {index}")]
    MissingField {
        /// The event type.
        kind: String,
        /// Zero-based index of the missing argument.
        index: usize,
    },

    /// A JSON payload could not be decoded.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Login handshake failures.
///
/// Every variant is fatal to the current session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// The login server answered with an `actionerror`.
    #[error("login rejected: {0}")]
    Rejected(String),

    /// The response carried no assertion at all.
    #[error("unexpected login response (missing assertion): {0}")]
    MissingAssertion(String),

    /// The assertion started with the `;;` escape; the remainder is the reason.
    #[error("login refused: {0}")]
    Refused(String),

    /// The response body was not valid JSON after stripping the prefix byte.
    #[error("malformed login response: {0}")]
    Malformed(String),

    /// A `challstr` event did not carry a key and a challenge.
    #[error("malformed challenge: {0}")]
    BadChallenge(String),
}
