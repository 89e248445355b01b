//! Error types for logkit
//!
//! Every diagnostic produced while a script or command is executing goes
//! through [`ExecContext::make_error`](crate::ExecContext::make_error), which
//! prepends the current source location. The exact prefix format is part of
//! the observable contract: `"<origin>:<line>: error: <message>"` inside a
//! nested source, plain `"error: <message>"` otherwise.

use thiserror::Error;

/// Result type alias using logkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Logkit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A source-prefixed diagnostic: malformed statement, unresolved
    /// variable, unknown command, unreadable script, engine failure.
    #[error("{0}")]
    Command(String),

    /// User-requested abort of a running statement. Distinct from engine
    /// failure so interactive callers can tell the two apart.
    #[error("{0}")]
    Cancelled(String),

    /// I/O error raised outside any source scope.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when this error is a user cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
