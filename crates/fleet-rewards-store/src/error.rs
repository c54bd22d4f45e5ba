use std::fmt::{Display, Formatter};

/// Storage-level failure taxonomy. Idempotent replays are *not* errors; they
/// surface as distinguished outcomes (`ApplyOutcome::AlreadyApplied`,
/// `CreditOutcome::AlreadyCredited`, ...) from the operations themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Conflict(String),
    PreconditionFailed(String),
    InvalidArgument(String),
    InvalidState(String),
    ResourceExhausted(String),
    /// Transient storage failure; callers may retry.
    Storage(String),
}

impl StoreError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidState(_) => "invalid_state",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Storage(_) => "storage",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(m)
            | Self::Conflict(m)
            | Self::PreconditionFailed(m)
            | Self::InvalidArgument(m)
            | Self::InvalidState(m)
            | Self::ResourceExhausted(m)
            | Self::Storage(m) => write!(f, "{}: {m}", self.kind()),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Typed detection of a unique-index collision. Idempotent retries must be
/// recognized from the SQLite extended result code, never by inspecting
/// error message text.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(e, _) = err {
        e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    } else {
        false
    }
}
