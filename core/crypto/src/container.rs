//! Container framing for encrypted data.
//!
//! # Embedded layout
//! ```text
//! [ ciphertext | iv (16) | salt (16) | tag (24) ]
//! ```
//! There are no length prefixes: field boundaries follow from the fixed
//! field sizes and the total length. The tag covers every byte before it.
//!
//! In detached mode the container is the ciphertext alone and the
//! [`EncryptionMetadata`] travels separately.
//!
//! The offset helpers here are shared by the in-memory and file engines, so
//! both produce the same byte layout.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::keys::{Iv, Salt, Tag, IV_LENGTH, SALT_LENGTH, TAG_LENGTH};
use cbcvault_common::{Error, Result};

/// Length of the `iv || salt || tag` trailer.
pub const TRAILER_LENGTH: usize = IV_LENGTH + SALT_LENGTH + TAG_LENGTH;

/// Shortest embedded container that can be parsed.
pub const MIN_EMBEDDED_LENGTH: usize = TRAILER_LENGTH;

/// How an encrypted container carries its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Metadata is appended to the ciphertext.
    #[default]
    Embedded,
    /// The container holds ciphertext only.
    Detached,
}

/// Reject embedded containers too short to hold a trailer.
///
/// Runs before any cryptographic work.
pub fn check_embedded_length(total: u64) -> Result<()> {
    if total < MIN_EMBEDDED_LENGTH as u64 {
        return Err(Error::TamperedData(
            "Incorrect data length, data tampered with.".to_string(),
        ));
    }
    Ok(())
}

/// End of the ciphertext region (exclusive) in an embedded container.
pub fn ciphertext_end(total: u64) -> u64 {
    total - TRAILER_LENGTH as u64
}

/// Offset of the `iv || salt || tag` trailer in an embedded container.
pub fn trailer_offset(total: u64) -> u64 {
    ciphertext_end(total)
}

/// End of the authenticated region (exclusive): everything but the tag.
pub fn authenticated_end(total: u64) -> u64 {
    total - TAG_LENGTH as u64
}

/// The public values needed to authenticate and decrypt a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionMetadata {
    pub iv: Iv,
    pub salt: Salt,
    pub tag: Tag,
}

impl EncryptionMetadata {
    /// Build metadata from caller-supplied parts.
    ///
    /// # Errors
    /// - Returns a validation error if any part is missing or has the wrong
    ///   length
    pub fn from_parts(iv: Option<&[u8]>, salt: Option<&[u8]>, tag: Option<&[u8]>) -> Result<Self> {
        let iv = iv.ok_or_else(|| Error::Validation("IV required.".to_string()))?;
        let salt = salt.ok_or_else(|| Error::Validation("Salt required.".to_string()))?;
        let tag = tag.ok_or_else(|| Error::Validation("Tag required.".to_string()))?;

        Ok(Self {
            iv: Iv::from_slice(iv)?,
            salt: Salt::from_slice(salt)?,
            tag: Tag::from_slice(tag)?,
        })
    }

    /// Serialize as the `iv || salt || tag` trailer.
    pub fn to_trailer(&self) -> [u8; TRAILER_LENGTH] {
        let mut bytes = [0u8; TRAILER_LENGTH];
        bytes[..IV_LENGTH].copy_from_slice(self.iv.as_bytes());
        bytes[IV_LENGTH..IV_LENGTH + SALT_LENGTH].copy_from_slice(self.salt.as_bytes());
        bytes[IV_LENGTH + SALT_LENGTH..].copy_from_slice(self.tag.as_bytes());
        bytes
    }

    /// Parse an `iv || salt || tag` trailer read as one block.
    pub fn from_trailer(bytes: &[u8; TRAILER_LENGTH]) -> Result<Self> {
        let (iv, rest) = bytes.split_at(IV_LENGTH);
        let (salt, tag) = rest.split_at(SALT_LENGTH);
        Ok(Self {
            iv: Iv::from_slice(iv)?,
            salt: Salt::from_slice(salt)?,
            tag: Tag::from_slice(tag)?,
        })
    }

    /// Render as JSON with base64-encoded fields.
    pub fn to_json(&self) -> Result<String> {
        let doc = MetadataDocument {
            iv: STANDARD.encode(self.iv.as_bytes()),
            salt: STANDARD.encode(self.salt.as_bytes()),
            tag: STANDARD.encode(self.tag.as_bytes()),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON produced by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: MetadataDocument =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;

        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| Error::Validation(format!("Invalid base64 in {}: {}", field, e)))
        };

        let iv = decode("iv", &doc.iv)?;
        let salt = decode("salt", &doc.salt)?;
        let tag = decode("tag", &doc.tag)?;
        Self::from_parts(Some(&iv), Some(&salt), Some(&tag))
    }
}

#[derive(Serialize, Deserialize)]
struct MetadataDocument {
    iv: String,
    salt: String,
    tag: String,
}

/// Borrowed view of a parsed embedded container.
#[derive(Debug)]
pub struct EmbeddedView<'a> {
    /// The ciphertext prefix.
    pub ciphertext: &'a [u8],
    /// Every byte covered by the tag: `ciphertext || iv || salt`.
    pub authenticated: &'a [u8],
    /// Values parsed from the trailer.
    pub metadata: EncryptionMetadata,
}

/// Split an embedded container into its fields.
///
/// # Errors
/// - Returns [`Error::TamperedData`] if the container is shorter than
///   [`MIN_EMBEDDED_LENGTH`]
pub fn split_embedded(container: &[u8]) -> Result<EmbeddedView<'_>> {
    let total = container.len() as u64;
    check_embedded_length(total)?;

    let ct_end = ciphertext_end(total) as usize;
    let auth_end = authenticated_end(total) as usize;

    let trailer: &[u8; TRAILER_LENGTH] = container[ct_end..]
        .try_into()
        .map_err(|_| Error::Internal("Trailer has unexpected length".to_string()))?;

    Ok(EmbeddedView {
        ciphertext: &container[..ct_end],
        authenticated: &container[..auth_end],
        metadata: EncryptionMetadata::from_trailer(trailer)?,
    })
}

/// Concatenate `ciphertext || iv || salt || tag`.
pub fn assemble(ciphertext: &[u8], metadata: &EncryptionMetadata) -> Vec<u8> {
    let mut container = Vec::with_capacity(ciphertext.len() + TRAILER_LENGTH);
    container.extend_from_slice(ciphertext);
    container.extend_from_slice(&metadata.to_trailer());
    container
}
