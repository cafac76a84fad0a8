//! AES-256 in CBC mode with PKCS#7 padding.
//!
//! CBC provides confidentiality only. Callers must authenticate the
//! ciphertext (see [`crate::mac`]) and verify it before calling [`decrypt`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::keys::{CipherKey, Iv, IV_LENGTH};
use cbcvault_common::{Error, Result};

pub(crate) type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
pub(crate) type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = IV_LENGTH;

pub(crate) fn encryptor(key: &CipherKey, iv: &Iv) -> Result<Aes256CbcEnc> {
    Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| Error::Internal(format!("Cipher initialization failed: {}", e)))
}

pub(crate) fn decryptor(key: &CipherKey, iv: &Iv) -> Result<Aes256CbcDec> {
    Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| Error::Internal(format!("Cipher initialization failed: {}", e)))
}

/// Length of the ciphertext produced for `plaintext_len` bytes of input.
///
/// PKCS#7 always adds between 1 and 16 bytes of padding.
pub fn ciphertext_len(plaintext_len: u64) -> u64 {
    (plaintext_len / BLOCK_SIZE as u64 + 1) * BLOCK_SIZE as u64
}

/// Encrypt plaintext under a freshly generated IV.
///
/// # Postconditions
/// - Returns (ciphertext, iv)
/// - The ciphertext length is a non-zero multiple of [`BLOCK_SIZE`]
pub fn encrypt(key: &CipherKey, plaintext: &[u8]) -> Result<(Vec<u8>, Iv)> {
    let iv = Iv::generate()?;
    let ciphertext = encrypt_with_iv(key, &iv, plaintext)?;
    Ok((ciphertext, iv))
}

/// Encrypt plaintext with a specific IV.
///
/// # Warning
/// Reusing an IV with the same key leaks equality of plaintext prefixes.
pub fn encrypt_with_iv(key: &CipherKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    Ok(encryptor(key, iv)?.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt ciphertext and strip the padding.
///
/// # Errors
/// - Returns error if the ciphertext length is not a multiple of the block size
/// - Returns error if the padding is malformed
pub fn decrypt(key: &CipherKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::Internal(format!(
            "Invalid ciphertext length: {}",
            ciphertext.len()
        )));
    }

    decryptor(key, iv)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Internal("Decryption failed: invalid padding".to_string()))
}
