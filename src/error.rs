//! Error types for the yokadi core.
//!
//! Every fallible operation in the crate surfaces one of these variants.
//! The store never recovers internally: it rolls back the current
//! transaction and returns the typed error to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error classes used by callers (shells, daemons) to decide how to
/// report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed user input: bad date, bad id, empty required field.
    UserInput,
    /// An entity lookup failed.
    NotFound,
    /// Uniqueness violation, held lock, or a merge abandoned by the user.
    Conflict,
    /// A schema-level violation that the invariants should have prevented.
    Integrity,
    /// Version-control failure during sync.
    Vcs,
    /// The remote dump format version cannot be imported.
    DumpVersion,
    /// Anything unanticipated; the caller should report it as a bug.
    Fatal,
}

/// Main error type for yokadi operations.
#[derive(Error, Debug)]
pub enum Error {
    // User input errors
    #[error("Invalid duration: {0}")]
    InvalidDelta(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Invalid input: {0}")]
    UserInput(String),

    #[error("Parse error at line {line}: {message}")]
    MeditParse { line: usize, message: String },

    // Lookup failures
    #[error("{kind} not found: {reference}")]
    NotFound {
        kind: &'static str,
        reference: String,
    },

    // Conflicts
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Task is being edited by process {pid}")]
    LockHeld { pid: u32 },

    // Store integrity
    #[error("Integrity error: {0}")]
    Integrity(String),

    // Sync failures
    #[error("Remote dump is at version {remote}, local code handles version {local}")]
    DumpVersion { local: u32, remote: u32 },

    #[error("Push rejected: remote has commits that are not merged locally")]
    NotFastForward,

    #[error("VCS error: {0}")]
    Vcs(String),

    // Environment and IO failures
    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDelta(_)
            | Error::InvalidDate(_)
            | Error::InvalidRecurrence(_)
            | Error::InvalidId(_)
            | Error::UserInput(_)
            | Error::MeditParse { .. } => ErrorKind::UserInput,

            Error::NotFound { .. } => ErrorKind::NotFound,

            Error::Conflict(_) | Error::LockHeld { .. } => ErrorKind::Conflict,

            Error::Integrity(_) => ErrorKind::Integrity,

            Error::DumpVersion { .. } => ErrorKind::DumpVersion,

            Error::NotFastForward | Error::Vcs(_) | Error::Git(_) => ErrorKind::Vcs,

            Error::LockFailed(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Fatal,
        }
    }

    pub(crate) fn not_found(kind: &'static str, reference: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            reference: reference.into(),
        }
    }
}

/// Result type alias for yokadi operations.
pub type Result<T> = std::result::Result<T, Error>;
