//! Common error types for CbcVault.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level error type for CbcVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required input is missing, empty or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container is too short to hold the framing trailer.
    #[error("Tampered data: {0}")]
    TamperedData(String),

    /// Authentication tag did not match.
    ///
    /// The message never says whether the password or the data was wrong.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A cryptographic primitive failed.
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error into the public error taxonomy.
    ///
    /// I/O and serialization failures are collaborator failures and report
    /// as [`ErrorKind::Internal`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::TamperedData(_) => ErrorKind::TamperedData,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Internal(_) | Error::Io(_) | Error::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Coarse error classification exposed in operation outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    TamperedData,
    Authentication,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::TamperedData => "tampered-data",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
