//! Centralized error types for mailstash.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a run during which a mailbox operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Login,
    Select,
    Search,
    Fetch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connect => "connect",
            Phase::Login => "login",
            Phase::Select => "select",
            Phase::Search => "search",
            Phase::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// All errors produced by the mailstash library.
///
/// There is deliberately no decode variant: malformed MIME and header
/// encodings degrade to best-effort values instead of failing.
#[derive(Error, Debug)]
pub enum StashError {
    /// Network or TLS failure. Fatal to the run.
    #[error("Connection failed during {phase}: {reason}")]
    Connection { phase: Phase, reason: String },

    /// The server rejected the credentials. Fatal to the run.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The mailbox does not exist or cannot be selected. Fatal to the run.
    #[error("Cannot select mailbox '{name}': {reason}")]
    Mailbox { name: String, reason: String },

    /// One message could not be fetched. Scoped to that message.
    #[error("Failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The log file exists but is not a valid attachment log.
    #[error("Invalid attachment log '{path}': {reason}")]
    InvalidLog { path: PathBuf, reason: String },

    /// A processing window of zero messages, or above the configured cap.
    #[error("Window size must be a positive integer no larger than run.max_window")]
    InvalidWindow,

    /// Missing or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, StashError>`.
pub type Result<T> = std::result::Result<T, StashError>;

impl StashError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the whole run rather than a single message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Auth(_) | Self::Mailbox { .. } | Self::Config(_)
        )
    }

    /// The run phase a fatal mailbox error belongs to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connection { phase, .. } => Some(*phase),
            Self::Auth(_) => Some(Phase::Login),
            Self::Mailbox { .. } => Some(Phase::Select),
            Self::Fetch { .. } => Some(Phase::Fetch),
            _ => None,
        }
    }
}
