//! Unified error handling for psbot.
//!
//! This module provides the error hierarchy for the engine: user-facing
//! command errors, per-handler failures, query failures, transport failures
//! and the session-level errors that end a run.

use ps_proto::{LoginError, ProtocolError};
use thiserror::Error;

// ============================================================================
// Command Errors (user-facing)
// ============================================================================

/// An expected, user-facing failure raised inside a command.
///
/// The router catches it and sends the message back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The standard rank/sysop rejection.
    pub fn access_denied() -> Self {
        Self::new("Access denied.")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// Handler Errors (built-ins, watchers, commands, filters, pages)
// ============================================================================

/// Errors raised while handling an event.
///
/// Handler failures are isolated: the dispatcher logs them and moves on.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error("login request failed: {0}")]
    LoginTransport(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Command(_) => "command_error",
            Self::Protocol(_) => "protocol_error",
            Self::Query(QueryError::Timeout { .. }) => "query_timeout",
            Self::Query(_) => "query_failed",
            Self::Login(_) => "auth_failure",
            Self::LoginTransport(_) => "login_transport",
            Self::Panicked(_) => "panicked",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Query Errors
// ============================================================================

/// Why a query did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{kind} query timed out after {waited_ms}ms")]
    Timeout { kind: String, waited_ms: u64 },

    #[error("connection closed before a response arrived")]
    Closed,

    #[error("malformed {kind} response: {reason}")]
    Malformed { kind: String, reason: String },
}

// ============================================================================
// Connection Errors
// ============================================================================

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed by server (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("connect aborted")]
    Aborted,
}

// ============================================================================
// Engine Errors (end a session)
// ============================================================================

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authentication failed: {0}")]
    Auth(#[source] LoginError),

    #[error("login server unreachable: {0}")]
    LoginTransport(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl EngineError {
    /// Whether reconnecting can help. Credential rejections repeat on every
    /// attempt, so they stop the supervisor.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Auth(LoginError::Rejected(_) | LoginError::Refused(_))
        )
    }
}
