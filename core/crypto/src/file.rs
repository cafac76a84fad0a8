//! Authenticated encryption for files of any size.
//!
//! Files use the same container layout as [`crate::engine`]. Every pass over
//! a file goes through one chunk-sized buffer:
//!
//! - Encryption: stream-encrypt into a staging file, append `iv || salt`,
//!   MAC the staging file from offset 0, append the tag, rename into place.
//! - Decryption: read the trailer, MAC the authenticated region, compare,
//!   and only then stream-decrypt into a staging file and rename it into
//!   place. A failed decryption never creates the destination.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, warn};

use crate::compare::constant_time_eq;
use crate::config::EngineConfig;
use crate::container::{self, EncryptionMetadata, FrameMode, TRAILER_LENGTH};
use crate::engine::AUTH_FAILED;
use crate::kdf::derive_key_material;
use crate::keys::{Iv, Salt};
use crate::mac::TagHasher;
use crate::outcome::{FileOutcome, FileReport, Outcome};
use crate::progress::ProgressListener;
use crate::stream::{DecryptingStream, EncryptingStream};
use cbcvault_common::{Error, Result, Secret};

/// Password-based authenticated encryption for files.
#[derive(Debug, Clone)]
pub struct FileCipher {
    config: EngineConfig,
}

impl FileCipher {
    /// Create a file engine with the given configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Encrypt `source` into `destination`.
    ///
    /// `destination` defaults to `source`, in which case the file is
    /// replaced by its encrypted form.
    ///
    /// # Postconditions
    /// - Embedded mode: destination holds `ciphertext || iv || salt || tag`
    /// - Detached mode: destination holds the ciphertext; the returned
    ///   metadata must be kept to decrypt it
    /// - If `delete_source` is set and the destination is a different file,
    ///   the source is removed after the destination is in place
    ///
    /// # Errors
    /// - [`Error::Validation`] for an empty secret
    /// - [`Error::NotFound`] if the source does not exist
    pub fn try_encrypt_file(
        &self,
        source: &Path,
        destination: Option<&Path>,
        secret: &Secret,
        mode: FrameMode,
        delete_source: bool,
        progress: &dyn ProgressListener,
    ) -> Result<FileReport> {
        if secret.is_empty() {
            return Err(Error::Validation("Password required.".to_string()));
        }

        let destination = destination.unwrap_or(source);
        let (mut reader, source_len) = open_source(source)?;
        let in_place = is_same_file(source, destination)?;

        info!(
            source = %source.display(),
            destination = %destination.display(),
            size = source_len,
            mode = ?mode,
            "Encrypting file"
        );

        let salt = Salt::generate()?;
        let keys = derive_key_material(secret.as_bytes(), &salt, &self.config.kdf)?;

        let mut staging = create_staging(destination)?;
        let file = staging.as_file_mut();

        let (iv, mut written) = EncryptingStream::new(keys.cipher_key())
            .with_chunk_size(self.config.chunk_size)?
            .encrypt_stream(&mut reader, &mut *file, source_len, progress)?;
        drop(reader);

        if mode == FrameMode::Embedded {
            progress.on_progress(0, "Writing additional data to file...");
            file.write_all(iv.as_bytes())?;
            file.write_all(salt.as_bytes())?;
            written += (iv.as_bytes().len() + salt.as_bytes().len()) as u64;
        }

        let mut hasher = TagHasher::new(keys.auth_key())?;
        hasher.update_range(&mut *file, 0, written, self.config.chunk_size, progress)?;
        if mode == FrameMode::Detached {
            append_detached_fields(&mut hasher, &iv, &salt);
        }
        let tag = hasher.finalize();

        if mode == FrameMode::Embedded {
            file.seek(SeekFrom::End(0))?;
            file.write_all(tag.as_bytes())?;
            written += tag.as_bytes().len() as u64;
            progress.on_progress(100, "Additional data written to file.");
        }

        commit(staging, destination)?;

        if delete_source && !in_place {
            fs::remove_file(source)?;
            debug!(source = %source.display(), "Source file deleted");
        }

        info!(destination = %destination.display(), size = written, "File encrypted");

        Ok(FileReport {
            destination: destination.to_path_buf(),
            bytes_written: written,
            metadata: EncryptionMetadata { iv, salt, tag },
        })
    }

    /// Authenticate and decrypt `source` into `destination`.
    ///
    /// `metadata` is `None` for embedded files; detached files must supply
    /// the IV, salt and tag returned at encryption time. `destination`
    /// defaults to `source`.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the source does not exist, checked first
    /// - [`Error::Validation`] for an empty secret
    /// - [`Error::TamperedData`] if an embedded file is shorter than the
    ///   trailer
    /// - [`Error::Authentication`] if the tag does not match; the
    ///   destination is not touched in that case
    pub fn try_decrypt_file(
        &self,
        source: &Path,
        destination: Option<&Path>,
        secret: &Secret,
        metadata: Option<&EncryptionMetadata>,
        delete_source: bool,
        progress: &dyn ProgressListener,
    ) -> Result<FileReport> {
        let (mut reader, total) = open_source(source)?;
        if secret.is_empty() {
            return Err(Error::Validation("Password required.".to_string()));
        }

        let destination = destination.unwrap_or(source);
        let in_place = is_same_file(source, destination)?;
        let detached = metadata.is_some();

        info!(
            source = %source.display(),
            destination = %destination.display(),
            size = total,
            detached,
            "Decrypting file"
        );

        let (metadata, authenticated_end, ciphertext_len) = match metadata {
            Some(metadata) => (*metadata, total, total),
            None => {
                container::check_embedded_length(total)?;
                let trailer = read_trailer(&mut reader, total)?;
                (
                    trailer,
                    container::authenticated_end(total),
                    container::ciphertext_end(total),
                )
            }
        };

        let keys = derive_key_material(secret.as_bytes(), &metadata.salt, &self.config.kdf)?;

        let mut hasher = TagHasher::new(keys.auth_key())?;
        hasher.update_range(
            &mut reader,
            0,
            authenticated_end,
            self.config.chunk_size,
            progress,
        )?;
        if detached {
            append_detached_fields(&mut hasher, &metadata.iv, &metadata.salt);
        }
        let expected = hasher.finalize();

        if !constant_time_eq(expected.as_bytes(), metadata.tag.as_bytes())? {
            warn!(source = %source.display(), "Tag mismatch while decrypting file");
            return Err(Error::Authentication(AUTH_FAILED.to_string()));
        }

        reader.seek(SeekFrom::Start(0))?;
        let mut staging = create_staging(destination)?;
        let written = DecryptingStream::new(keys.cipher_key())
            .with_chunk_size(self.config.chunk_size)?
            .decrypt_stream(
                &mut reader,
                staging.as_file_mut(),
                &metadata.iv,
                ciphertext_len,
                progress,
            )?;
        drop(reader);

        commit(staging, destination)?;

        if delete_source && !in_place {
            fs::remove_file(source)?;
            debug!(source = %source.display(), "Source file deleted");
        }

        info!(destination = %destination.display(), size = written, "File decrypted");

        Ok(FileReport {
            destination: destination.to_path_buf(),
            bytes_written: written,
            metadata,
        })
    }

    /// Encrypt a file, reporting failures as an outcome.
    pub fn encrypt_file(
        &self,
        source: &Path,
        destination: Option<&Path>,
        secret: &Secret,
        mode: FrameMode,
        delete_source: bool,
        progress: &dyn ProgressListener,
    ) -> FileOutcome {
        Outcome::from_result(
            self.try_encrypt_file(source, destination, secret, mode, delete_source, progress),
            "File encrypted successfully.",
        )
    }

    /// Decrypt a file, reporting failures as an outcome.
    pub fn decrypt_file(
        &self,
        source: &Path,
        destination: Option<&Path>,
        secret: &Secret,
        metadata: Option<&EncryptionMetadata>,
        delete_source: bool,
        progress: &dyn ProgressListener,
    ) -> FileOutcome {
        Outcome::from_result(
            self.try_decrypt_file(source, destination, secret, metadata, delete_source, progress),
            "File decrypted successfully.",
        )
    }
}

impl Default for FileCipher {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

/// Detached containers carry no trailer, so the IV and salt are fed to the
/// MAC after the ciphertext to keep the tag scope identical.
fn append_detached_fields(hasher: &mut TagHasher, iv: &Iv, salt: &Salt) {
    hasher.update(iv.as_bytes());
    hasher.update(salt.as_bytes());
}

/// Open a source file under a shared lock and return it with its length.
fn open_source(path: &Path) -> Result<(File, u64)> {
    if !path.is_file() {
        return Err(Error::NotFound(format!(
            "File \"{}\" not found.",
            path.display()
        )));
    }

    let file = File::open(path)?;
    file.lock_shared()?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

/// Read the `iv || salt || tag` trailer as one block.
fn read_trailer(reader: &mut File, total: u64) -> Result<EncryptionMetadata> {
    let mut trailer = [0u8; TRAILER_LENGTH];
    reader.seek(SeekFrom::Start(container::trailer_offset(total)))?;
    reader.read_exact(&mut trailer)?;
    EncryptionMetadata::from_trailer(&trailer)
}

/// Create an exclusively locked staging file next to `destination`.
///
/// The staging file is removed automatically if it is dropped before
/// [`commit`].
fn create_staging(destination: &Path) -> Result<NamedTempFile> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let staging = Builder::new()
        .prefix(".cbcvault-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staging.as_file().lock()?;
    Ok(staging)
}

/// Flush the staging file and atomically move it onto `destination`.
fn commit(staging: NamedTempFile, destination: &Path) -> Result<()> {
    staging.as_file().sync_all()?;
    let file = staging.persist(destination).map_err(|e| Error::Io(e.error))?;
    drop(file);
    Ok(())
}

fn is_same_file(a: &Path, b: &Path) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    if !b.exists() {
        return Ok(false);
    }
    Ok(a.canonicalize()? == b.canonicalize()?)
}
