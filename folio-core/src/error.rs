/*!
Error types for the Folio core engine.
*/

use folio_retry::RetryableError;
use thiserror::Error;

/// Result type used throughout the Folio core.
pub type Result<T> = std::result::Result<T, FolioError>;

/// Errors that can occur while reading or mutating versioned state.
#[derive(Error, Debug)]
pub enum FolioError {
    /// Owner, version, section, tag or document does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A version was applied to an owner it does not belong to
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation while allocating a version number or inserting a row
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or empty required input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transaction aborted for reasons unrelated to the caller's input
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Snapshot body does not match the hash recorded when it was captured
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Snapshot or store file written by an incompatible format version
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl FolioError {
    /// Create a new not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a new forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl RetryableError for FolioError {
    fn is_transient(&self) -> bool {
        self.is_conflict()
    }
}
