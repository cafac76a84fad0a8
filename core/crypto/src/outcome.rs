//! Structured operation outcomes.
//!
//! The engines' public entry points never return `Err`. Every failure is
//! converted at the engine boundary into an [`Outcome`] with a success flag,
//! a human-readable message and an [`ErrorKind`].

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::container::EncryptionMetadata;
use crate::keys::{Iv, Salt, Tag};
use cbcvault_common::{Error, ErrorKind, SensitiveBytes};

/// Result of a public engine operation.
#[derive(Debug)]
pub struct Outcome<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
    /// Error classification when `success` is false.
    pub kind: Option<ErrorKind>,
    /// Operation payload when `success` is true.
    pub payload: Option<T>,
}

impl<T> Outcome<T> {
    /// Successful outcome carrying `payload`.
    pub fn ok(payload: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            payload: Some(payload),
        }
    }

    /// Failed outcome built from an error.
    pub fn failed(error: &Error) -> Self {
        let message = match error {
            Error::Validation(msg)
            | Error::NotFound(msg)
            | Error::TamperedData(msg)
            | Error::Authentication(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            success: false,
            message,
            kind: Some(error.kind()),
            payload: None,
        }
    }

    /// Build an outcome from a result, using `message` on success.
    pub fn from_result(result: cbcvault_common::Result<T>, message: &str) -> Self {
        match result {
            Ok(payload) => Self::ok(payload, message),
            Err(e) => Self::failed(&e),
        }
    }

    /// Convert back into a `Result`, discarding the message on success.
    pub fn into_result(self) -> std::result::Result<T, (ErrorKind, String)> {
        match (self.payload, self.kind) {
            (Some(payload), _) if self.success => Ok(payload),
            (_, kind) => Err((kind.unwrap_or(ErrorKind::Internal), self.message)),
        }
    }
}

/// Payload of an in-memory encryption.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The container: `ciphertext || iv || salt || tag` when embedded,
    /// the ciphertext alone when detached.
    pub container: Vec<u8>,
    /// Metadata needed to decrypt, returned in both modes.
    pub metadata: EncryptionMetadata,
}

impl Sealed {
    /// The container as standard base64 text.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.container)
    }

    /// Salt used to derive the keys.
    pub fn salt(&self) -> &Salt {
        &self.metadata.salt
    }

    /// IV the plaintext was encrypted under.
    pub fn iv(&self) -> &Iv {
        &self.metadata.iv
    }

    /// Truncated authentication tag.
    pub fn tag(&self) -> &Tag {
        &self.metadata.tag
    }
}

/// Payload of an in-memory decryption.
#[derive(Debug)]
pub struct Opened {
    /// Recovered plaintext, wiped on drop.
    pub plaintext: SensitiveBytes,
    /// Metadata the container was verified against.
    pub metadata: EncryptionMetadata,
}

impl Opened {
    /// The plaintext as UTF-8 text, if valid.
    pub fn text(&self) -> Option<&str> {
        self.plaintext.as_str()
    }
}

/// Payload of a file encryption or decryption.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Path of the file that was written.
    pub destination: PathBuf,
    /// Bytes written to the destination.
    pub bytes_written: u64,
    /// Metadata used for the operation.
    pub metadata: EncryptionMetadata,
}

pub type EncryptionOutcome = Outcome<Sealed>;
pub type DecryptionOutcome = Outcome<Opened>;
pub type FileOutcome = Outcome<FileReport>;
