//! Structured error types for selfprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only session lifecycle failures are errors; per-record conditions (foreign
//! process, wrong record kind, empty stack, unresolved symbol) are outcomes
//! counted by the dispatcher and never surface here.

use thiserror::Error;

/// Why the tracing facility refused to create a session
#[derive(Error, Debug)]
pub enum StartFailure {
    #[error("a session is already running on this controller")]
    AlreadyStarted,

    #[error("session name is already in use")]
    NameCollision,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Os(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// The session could not be created. Fatal for the run, never retried.
    #[error("Failed to start trace session '{name}': {reason}")]
    StartFailed {
        name: String,
        #[source]
        reason: StartFailure,
    },

    /// The session could not be stopped cleanly. Cleanup still ran.
    #[error("Failed to stop trace session '{name}': {source}")]
    StopFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session handle {0} does not belong to the running session")]
    UnknownHandle(u64),

    #[error("Session '{0}' is already being consumed")]
    AlreadyConsuming(String),

    #[error("Trace {0} thread panicked")]
    ThreadPanicked(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for failures that must end the run
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::StopFailed { .. })
    }
}
