//! Unified error types for Lark tasks.
//!
//! Every suspend-capable operation in the host (scheduler tasks, HTTP requests,
//! handler invocations) resolves to a [`TaskResult`]. The variants mirror how
//! a failure should be surfaced to the user:
//!
//! | Variant | Meaning | Surfaced as |
//! |---------|---------|-------------|
//! | [`Http`](TaskError::Http) | non-2xx response | `http error <status>` |
//! | [`Timeout`](TaskError::Timeout) | deadline exceeded | `request timed out` |
//! | [`Domain`](TaskError::Domain) | expected business failure | the message itself |
//! | [`Transport`](TaskError::Transport) | connection/decoding failure | `connection error` |
//! | [`Cancelled`](TaskError::Cancelled) | cooperative cancellation | nothing (silent drop) |
//! | [`Unexpected`](TaskError::Unexpected) | anything else, including panics | `Error: …` |
//!
//! Plugin load failures are not task errors; see `lark_framework::LoadError`.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// TaskError
// =============================================================================

/// Errors produced by scheduler tasks and everything running inside them.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The remote server answered with a status code of 400 or above.
    #[error("http error {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The task or request exceeded its deadline.
    #[error("request timed out after {}s", .after.as_secs())]
    Timeout {
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// An expected, plugin-specific failure ("no results", "invalid input").
    #[error("{0}")]
    Domain(String),

    /// The connection could not be established or the body could not be decoded.
    #[error("connection error: {0}")]
    Transport(String),

    /// The task was cancelled before it completed.
    #[error("task cancelled")]
    Cancelled,

    /// Anything else. Logged with full context by the dispatch boundary.
    #[error("{0}")]
    Unexpected(String),
}

impl TaskError {
    /// Creates a domain error with the given user-facing message.
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    /// Creates an unexpected error.
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Returns `true` for cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the error is an expected, recoverable condition that
    /// a handler may retry or report without logging at error level.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Timeout { .. } | Self::Domain(_) | Self::Transport(_)
        )
    }

    /// Returns the HTTP status for [`TaskError::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("invalid json: {err}"))
    }
}

/// Result type for task bodies and everything awaited inside them.
pub type TaskResult<T> = Result<T, TaskError>;
