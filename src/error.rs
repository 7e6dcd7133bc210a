// Error taxonomy for store operations

use rusqlite::ErrorCode as SqliteCode;
use serde::Serialize;
use std::path::PathBuf;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Stable, machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidTitle,
    EmptyTitle,
    InvalidPriority,
    InvalidValue,
    TaskNotFound,
    AlreadyCompleted,
    InvalidLabel,
    EmptyLabel,
    LabelNotFound,
    LinkExists,
    NoUpdates,
    DbConnError,
    DbQueryError,
    InvalidPath,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidTitle => "INVALID_TITLE",
            ErrorCode::EmptyTitle => "EMPTY_TITLE",
            ErrorCode::InvalidPriority => "INVALID_PRIORITY",
            ErrorCode::InvalidValue => "INVALID_VALUE",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::AlreadyCompleted => "ALREADY_COMPLETED",
            ErrorCode::InvalidLabel => "INVALID_LABEL",
            ErrorCode::EmptyLabel => "EMPTY_LABEL",
            ErrorCode::LabelNotFound => "LABEL_NOT_FOUND",
            ErrorCode::LinkExists => "LINK_EXISTS",
            ErrorCode::NoUpdates => "NO_UPDATES",
            ErrorCode::DbConnError => "DB_CONN_ERROR",
            ErrorCode::DbQueryError => "DB_QUERY_ERROR",
            ErrorCode::InvalidPath => "INVALID_PATH",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the store can report.
///
/// Validation variants are produced before the database is touched.
/// `DbConn` and `DbQuery` wrap the underlying `rusqlite::Error`, which stays
/// reachable through `std::error::Error::source`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task title is required")]
    InvalidTitle,

    #[error("Task title cannot be empty")]
    EmptyTitle,

    #[error("Invalid priority {0:?} (expected one of ASAP, 1, 2, 3, 4)")]
    InvalidPriority(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Task {0} is already completed")]
    AlreadyCompleted(i64),

    #[error("Label name is required")]
    InvalidLabel,

    #[error("Label name cannot be empty")]
    EmptyLabel,

    #[error("Label {0} not found")]
    LabelNotFound(i64),

    #[error("Task {task_id} is already linked to label {label_id}")]
    LinkExists { task_id: i64, label_id: i64 },

    #[error("No updatable fields supplied")]
    NoUpdates,

    #[error("Database connection error: {source}")]
    DbConn {
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database query error: {source}")]
    DbQuery {
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid database path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::InvalidTitle => ErrorCode::InvalidTitle,
            StoreError::EmptyTitle => ErrorCode::EmptyTitle,
            StoreError::InvalidPriority(_) => ErrorCode::InvalidPriority,
            StoreError::InvalidValue(_) => ErrorCode::InvalidValue,
            StoreError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            StoreError::AlreadyCompleted(_) => ErrorCode::AlreadyCompleted,
            StoreError::InvalidLabel => ErrorCode::InvalidLabel,
            StoreError::EmptyLabel => ErrorCode::EmptyLabel,
            StoreError::LabelNotFound(_) => ErrorCode::LabelNotFound,
            StoreError::LinkExists { .. } => ErrorCode::LinkExists,
            StoreError::NoUpdates => ErrorCode::NoUpdates,
            StoreError::DbConn { .. } => ErrorCode::DbConnError,
            StoreError::DbQuery { .. } => ErrorCode::DbQueryError,
            StoreError::InvalidPath { .. } => ErrorCode::InvalidPath,
        }
    }

    pub(crate) fn invalid_path<S: Into<String>>(path: impl Into<PathBuf>, reason: S) -> Self {
        StoreError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised while opening the connection
    pub(crate) fn conn(source: rusqlite::Error) -> Self {
        StoreError::DbConn { source }
    }
}

/// True when `err` is a `PRIMARY KEY` constraint failure
pub(crate) fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Classify engine failures: anything that means the database file itself is
/// unusable is a connection error, everything else is a query error.
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let is_conn = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => matches!(
                failure.code,
                SqliteCode::CannotOpen
                    | SqliteCode::NotADatabase
                    | SqliteCode::DatabaseBusy
                    | SqliteCode::DatabaseLocked
                    | SqliteCode::PermissionDenied
                    | SqliteCode::ReadOnly
                    | SqliteCode::SystemIoFailure
                    | SqliteCode::DatabaseCorrupt
            ),
            _ => false,
        };

        if is_conn {
            StoreError::DbConn { source: err }
        } else {
            StoreError::DbQuery { source: err }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_codes_are_stable_strings() {
        assert_eq!(StoreError::InvalidTitle.code().as_str(), "INVALID_TITLE");
        assert_eq!(StoreError::TaskNotFound(7).code().to_string(), "TASK_NOT_FOUND");
        assert_eq!(
            StoreError::LinkExists { task_id: 1, label_id: 2 }.code().as_str(),
            "LINK_EXISTS"
        );
        assert_eq!(StoreError::invalid_path("a|b", "bad").code(), ErrorCode::InvalidPath);
    }

    #[test]
    fn test_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::DbConnError).unwrap();
        assert_eq!(json, "\"DB_CONN_ERROR\"");
        let json = serde_json::to_string(&ErrorCode::NoUpdates).unwrap();
        assert_eq!(json, "\"NO_UPDATES\"");
    }

    #[test]
    fn test_connection_failures_classified() {
        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_CANTOPEN).into();
        assert_eq!(err.code(), ErrorCode::DbConnError);

        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY).into();
        assert_eq!(err.code(), ErrorCode::DbConnError);

        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_NOTADB).into();
        assert_eq!(err.code(), ErrorCode::DbConnError);
    }

    #[test]
    fn test_query_failures_classified() {
        let err: StoreError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).into();
        assert_eq!(err.code(), ErrorCode::DbQueryError);

        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), ErrorCode::DbQueryError);
    }

    #[test]
    fn test_primary_key_violation_detected() {
        assert!(is_primary_key_violation(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )));
        assert!(!is_primary_key_violation(&sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)));
        assert!(!is_primary_key_violation(&sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT)));
        assert!(!is_primary_key_violation(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_source_preserved() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.source().is_some());
        assert!(StoreError::EmptyTitle.source().is_none());
    }
}
