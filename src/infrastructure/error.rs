use thiserror::Error;

/// Closed set of storage failure subtypes. Driver error codes are folded
/// into these at the persistence boundary; no `rusqlite::Error` escapes it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duplicate entry")]
    DuplicateKey(#[source] rusqlite::Error),
    #[error("foreign key violation")]
    ForeignKey(#[source] rusqlite::Error),
    #[error("storage timeout")]
    Timeout(#[source] rusqlite::Error),
    #[error("storage unavailable")]
    Unavailable(#[source] rusqlite::Error),
    #[error("storage operation failed")]
    Other(#[source] rusqlite::Error),
}

impl StorageError {
    pub fn status(&self) -> u16 {
        match self {
            Self::DuplicateKey(_) => 409,
            Self::ForeignKey(_) => 400,
            Self::Timeout(_) => 504,
            Self::Unavailable(_) => 503,
            Self::Other(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateKey(_) => "DUPLICATE_ENTRY",
            Self::ForeignKey(_) => "FK_VIOLATION",
            Self::Timeout(_) => "DB_TIMEOUT",
            Self::Unavailable(_) => "DB_UNAVAILABLE",
            Self::Other(_) => "DB_OPERATION_FAILED",
        }
    }

    /// The underlying driver error, for boundary logging only.
    pub fn cause(&self) -> &rusqlite::Error {
        match self {
            Self::DuplicateKey(error)
            | Self::ForeignKey(error)
            | Self::Timeout(error)
            | Self::Unavailable(error)
            | Self::Other(error) => error,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &error {
            rusqlite::Error::SqliteFailure(cause, _) => match cause.code {
                ErrorCode::ConstraintViolation => match cause.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::DuplicateKey(error),
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ForeignKey(error),
                    _ => Self::Other(error),
                },
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Timeout(error),
                ErrorCode::CannotOpen | ErrorCode::NotADatabase => Self::Unavailable(error),
                _ => Self::Other(error),
            },
            _ => Self::Other(error),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::InvalidState(_) => 409,
            Self::Validation(_) => 400,
            Self::Io(_) | Self::Json(_) => 500,
            Self::Storage(storage) => storage.status(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Storage(storage) => storage.code(),
        }
    }

    /// Message safe to hand to the caller. Storage errors surface only the
    /// subtype label; the full cause stays in the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(storage) => storage.to_string(),
            Self::Io(_) => "internal I/O failure".to_string(),
            Self::Json(_) => "internal serialization failure".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(error))
    }
}
