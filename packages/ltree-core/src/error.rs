use thiserror::Error;

use crate::path::Path;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid label syntax: {0}")]
    InvalidLabelSyntax(String),
    #[error("path has {0} labels, more than the 65535 allowed")]
    PathTooLong(usize),
    #[error("index {index} out of range for path of depth {depth}")]
    IndexOutOfRange { index: isize, depth: usize },
    #[error("empty path has no parent")]
    NoParent,
    #[error("invalid lquery syntax: {0}")]
    InvalidPatternSyntax(String),
    #[error("invalid ltxtquery syntax: {0}")]
    InvalidQuerySyntax(String),
    #[error("unknown lookup: {0}")]
    UnknownLookup(String),
    #[error("target not found: {0}")]
    TargetNotFound(Path),
    #[error("position conflict: {0}")]
    PositionConflict(String),
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("'{0}' has descendants")]
    HasDescendants(Path),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Store failure, passed through unchanged as `source`.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl Error {
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn storage_msg(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the caller may re-resolve its intent and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrentModification(_) | Error::TargetNotFound(_)
        )
    }
}
