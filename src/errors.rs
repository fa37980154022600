//! Error type shared by index construction, persistence and the pipelines.
//!
#![deny(missing_docs)]
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building, saving or loading an index
/// or running one of the pipelines. Queries are total and never error.
#[derive(Debug, Error)]
pub enum Error {
    /// The whitelist file is empty, a line has the wrong length, or a line
    /// contains a symbol outside {A,C,G,T}.
    #[error("whitelist entry {line}: {reason}")]
    WhitelistFormat {
        /// 1-based entry number (0 for file-level problems).
        line: usize,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// A build parameter is outside its documented range.
    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// An index file is missing or unreadable. `code` identifies which:
    /// 1 = barcode table, 2 = match table, 3 = substitution table.
    #[error("index file '{}' is missing or unreadable (code {})", .path.display(), .code)]
    IndexIncomplete {
        /// Path of the file that could not be opened.
        path: PathBuf,
        /// Stable per-file code, also used as process exit-code offset.
        code: u8,
    },

    /// An index file was read but its content is malformed or the three
    /// tables are inconsistent with each other.
    #[error("corrupt index data: {0}")]
    SerializationCorrupt(String),

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error: 1 for user/parse errors, 2 and up
    /// for I/O and validation errors (2 + file code for an incomplete
    /// index).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::WhitelistFormat { .. } | Error::ParameterOutOfRange(_) => 1,
            Error::IndexIncomplete { code, .. } => 2 + *code as i32,
            Error::SerializationCorrupt(_) | Error::Io(_) => 2,
        }
    }
}
