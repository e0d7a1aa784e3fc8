use crate::model::Topic;
use thiserror::Error;

/// Failure conditions surfaced by the forum core.
#[derive(Debug, Error)]
pub enum ForumError {
    /// Lookup failed, or the entity lives in a board the viewer cannot see.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A topic with the same subject (case-insensitive) already exists in the board.
    #[error("a topic named \"{}\" already exists in this board", .0.subject)]
    DuplicateTopic(Box<Topic>),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity is visible but the viewer may not perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A unique or foreign key constraint rejected the write.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<rusqlite::Error> for ForumError {
    fn from(e: rusqlite::Error) -> Self {
        if matches!(
            e.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        ) {
            ForumError::Integrity(e.to_string())
        } else {
            ForumError::Storage(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;

/// Map "no rows" onto `NotFound` for single-row lookups.
pub(crate) trait OptionalNotFound<T> {
    fn or_not_found(self, what: &'static str) -> Result<T>;
}

impl<T> OptionalNotFound<T> for Option<T> {
    fn or_not_found(self, what: &'static str) -> Result<T> {
        self.ok_or(ForumError::NotFound(what))
    }
}
