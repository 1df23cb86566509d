//! Common error types for cueflow
//!
//! Every failure that crosses a component boundary is one of these variants.
//! Each variant carries a stable wire code (see [`Error::code`]) so the API
//! layer can map it to an HTTP status without inspecting message text.

use thiserror::Error;

/// Common result type for cueflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across cueflow components
#[derive(Error, Debug)]
pub enum Error {
    /// Schema or validation failure on input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown task id, track path, or preset
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write race, or a task already terminal in a disallowed way
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Global concurrent-task ceiling reached
    #[error("Busy: {0}")]
    Busy(String),

    /// File not in the supported extension set
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Extractor rejected the file contents
    #[error("Corrupt file: {0}")]
    CorruptFile(String),

    /// Extraction or generation exceeded its budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Filesystem read/write failed non-transiently
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable wire code for this error, as surfaced in `error.code`
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Busy(_) => "busy",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::CorruptFile(_) => "corrupt_file",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal",
        }
    }
}
