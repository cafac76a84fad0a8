//! Authentication tags using truncated HMAC-SHA384.
//!
//! The tag always covers `ciphertext || iv || salt` in that order. Files are
//! fed to the MAC incrementally, one chunk at a time.

use std::io::{Read, Seek, SeekFrom};

use hmac::{Hmac, Mac};
use sha2::Sha384;

use crate::keys::{AuthKey, Iv, Salt, Tag, TAG_LENGTH};
use crate::progress::{percent, ProgressListener};
use cbcvault_common::{Error, Result};

type HmacSha384 = Hmac<Sha384>;

/// Incremental tag computation.
#[derive(Clone)]
pub struct TagHasher {
    mac: HmacSha384,
}

impl TagHasher {
    /// Start a new tag computation under `key`.
    pub fn new(key: &AuthKey) -> Result<Self> {
        let mac = <HmacSha384 as Mac>::new_from_slice(key.as_bytes())
            .map_err(|e| Error::Internal(format!("Failed to create HMAC: {}", e)))?;
        Ok(Self { mac })
    }

    /// Feed bytes into the MAC.
    pub fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    /// Feed the `[start, end)` byte range of a seekable source into the MAC.
    ///
    /// Reads at most `chunk_size` bytes at a time and reports progress after
    /// each chunk.
    ///
    /// # Errors
    /// - I/O errors, including a source shorter than `end`
    pub fn update_range<R: Read + Seek>(
        &mut self,
        source: &mut R,
        start: u64,
        end: u64,
        chunk_size: usize,
        progress: &dyn ProgressListener,
    ) -> Result<()> {
        if end < start {
            return Err(Error::Internal(format!(
                "Invalid MAC range {}..{}",
                start, end
            )));
        }
        if chunk_size == 0 {
            return Err(Error::Validation("Chunk size must be positive".to_string()));
        }

        source.seek(SeekFrom::Start(start))?;

        let total = end - start;
        let mut buffer = vec![0u8; chunk_size];
        let mut done = 0u64;

        while done < total {
            let want = (total - done).min(chunk_size as u64) as usize;
            source.read_exact(&mut buffer[..want])?;
            self.mac.update(&buffer[..want]);
            done += want as u64;

            let pct = percent(done, total);
            let message = if pct < 100 {
                "Computing authentication tag..."
            } else {
                "Authentication tag computed."
            };
            progress.on_progress(pct, message);
        }

        Ok(())
    }

    /// Finish and truncate the MAC to [`TAG_LENGTH`] bytes.
    pub fn finalize(self) -> Tag {
        let full = self.mac.finalize().into_bytes();
        let mut tag = [0u8; TAG_LENGTH];
        tag.copy_from_slice(&full[..TAG_LENGTH]);
        Tag::from_bytes(tag)
    }
}

/// Compute the tag over `ciphertext || iv || salt`.
pub fn compute_tag(key: &AuthKey, ciphertext: &[u8], iv: &Iv, salt: &Salt) -> Result<Tag> {
    let mut hasher = TagHasher::new(key)?;
    hasher.update(ciphertext);
    hasher.update(iv.as_bytes());
    hasher.update(salt.as_bytes());
    Ok(hasher.finalize())
}
