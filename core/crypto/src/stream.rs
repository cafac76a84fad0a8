//! Streaming AES-256-CBC for large files.
//!
//! Data moves through a single fixed-size buffer, so memory use depends on
//! the chunk size and never on the input length. These adapters provide
//! confidentiality only; the file engine authenticates their output.

use std::io::{ErrorKind, Read, Write};

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
};

use crate::aes_cbc::{decryptor, encryptor, BLOCK_SIZE};
use crate::keys::{CipherKey, Iv};
use crate::progress::{percent, ProgressListener};
use cbcvault_common::{Error, Result};

/// Default chunk size for streaming operations (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

/// Check that a chunk size can be processed block by block.
pub fn validate_chunk_size(size: usize) -> Result<()> {
    if size == 0 || size % BLOCK_SIZE != 0 {
        return Err(Error::Validation(format!(
            "Chunk size must be a positive multiple of {} bytes, got {}",
            BLOCK_SIZE, size
        )));
    }
    Ok(())
}

/// Read until `buf` is full or the reader is exhausted.
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypting stream that processes data in chunks.
pub struct EncryptingStream<'a> {
    key: &'a CipherKey,
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream with the default chunk size.
    pub fn new(key: &'a CipherKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    ///
    /// # Errors
    /// - Returns error unless `size` is a positive multiple of the block size
    pub fn with_chunk_size(mut self, size: usize) -> Result<Self> {
        validate_chunk_size(size)?;
        self.chunk_size = size;
        Ok(self)
    }

    /// Encrypt data from reader and write the ciphertext to writer.
    ///
    /// `total_len` is the expected plaintext length and is only used for
    /// progress percentages.
    ///
    /// # Postconditions
    /// - Returns the generated IV and the number of ciphertext bytes written
    /// - The final block carries PKCS#7 padding, so an input that is an exact
    ///   multiple of the block size gains a whole padding block
    pub fn encrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        total_len: u64,
        progress: &dyn ProgressListener,
    ) -> Result<(Iv, u64)> {
        let iv = Iv::generate()?;
        let mut cipher = encryptor(self.key, &iv)?;

        // Spare block for the padding of the final chunk.
        let mut buffer = vec![0u8; self.chunk_size + BLOCK_SIZE];
        let mut processed = 0u64;
        let mut written = 0u64;

        loop {
            let n = read_full(&mut reader, &mut buffer[..self.chunk_size])?;
            processed += n as u64;

            if n < self.chunk_size {
                let ciphertext = cipher
                    .encrypt_padded_mut::<Pkcs7>(&mut buffer, n)
                    .map_err(|_| Error::Internal("Padding failed".to_string()))?;
                writer.write_all(ciphertext)?;
                written += ciphertext.len() as u64;
                progress.on_progress(100, "Encryption done.");
                break;
            }

            for block in buffer[..n].chunks_exact_mut(BLOCK_SIZE) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            writer.write_all(&buffer[..n])?;
            written += n as u64;
            progress.on_progress(percent(processed, total_len), "Encrypting...");
        }

        writer.flush()?;
        Ok((iv, written))
    }
}

/// Decrypting stream that processes ciphertext in chunks.
pub struct DecryptingStream<'a> {
    key: &'a CipherKey,
    chunk_size: usize,
}

impl<'a> DecryptingStream<'a> {
    /// Create a new decrypting stream with the default chunk size.
    pub fn new(key: &'a CipherKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Result<Self> {
        validate_chunk_size(size)?;
        self.chunk_size = size;
        Ok(self)
    }

    /// Decrypt exactly `ciphertext_len` bytes from reader into writer.
    ///
    /// # Preconditions
    /// - The ciphertext has already been authenticated
    /// - `ciphertext_len` is a positive multiple of the block size
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes written
    ///
    /// # Errors
    /// - I/O errors, including a reader shorter than `ciphertext_len`
    /// - Malformed length or padding
    pub fn decrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        iv: &Iv,
        ciphertext_len: u64,
        progress: &dyn ProgressListener,
    ) -> Result<u64> {
        if ciphertext_len == 0 || ciphertext_len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::Internal(format!(
                "Invalid ciphertext length: {}",
                ciphertext_len
            )));
        }

        let mut cipher = decryptor(self.key, iv)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut remaining = ciphertext_len;
        let mut written = 0u64;

        // The last chunk is held for unpadding, even when it is a full chunk.
        while remaining > self.chunk_size as u64 {
            reader.read_exact(&mut buffer)?;
            for block in buffer.chunks_exact_mut(BLOCK_SIZE) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            writer.write_all(&buffer)?;
            remaining -= self.chunk_size as u64;
            written += self.chunk_size as u64;
            progress.on_progress(
                percent(ciphertext_len - remaining, ciphertext_len),
                "Decrypting...",
            );
        }

        let tail = &mut buffer[..remaining as usize];
        reader.read_exact(tail)?;
        let plaintext = cipher
            .decrypt_padded_mut::<Pkcs7>(tail)
            .map_err(|_| Error::Internal("Decryption failed: invalid padding".to_string()))?;
        writer.write_all(plaintext)?;
        written += plaintext.len() as u64;
        writer.flush()?;
        progress.on_progress(100, "Decryption done.");

        Ok(written)
    }
}
