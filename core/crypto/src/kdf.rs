//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! One derivation produces both the cipher key and the authentication key,
//! so a password and salt always map to the same pair.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::keys::{DerivedKeyMaterial, Salt, DERIVED_KEY_LENGTH};
use cbcvault_common::{Error, Result};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of PBKDF2 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Create parameters with a custom iteration count.
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Standard parameters used for every container this crate writes.
    pub fn standard() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Derive `output_len` bytes from a secret and salt.
///
/// # Errors
/// - Returns error if the secret is empty
/// - Returns error if `iterations` or `output_len` is zero
///
/// # Security
/// The output is wiped when the returned buffer is dropped.
pub fn derive(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if secret.is_empty() {
        return Err(Error::Validation("Password required.".to_string()));
    }
    if iterations == 0 {
        return Err(Error::Validation(
            "KDF iteration count must be positive".to_string(),
        ));
    }
    if output_len == 0 {
        return Err(Error::Validation(
            "KDF output length must be positive".to_string(),
        ));
    }

    let mut output = Zeroizing::new(vec![0u8; output_len]);
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut output);
    Ok(output)
}

/// Derive the cipher and authentication keys for one operation.
///
/// Always requests exactly [`DERIVED_KEY_LENGTH`] bytes so the split into
/// cipher key and auth key is fixed.
pub fn derive_key_material(
    secret: &[u8],
    salt: &Salt,
    params: &KdfParams,
) -> Result<DerivedKeyMaterial> {
    let raw = derive(secret, salt.as_bytes(), params.iterations, DERIVED_KEY_LENGTH)?;
    let bytes: &[u8; DERIVED_KEY_LENGTH] = raw
        .as_slice()
        .try_into()
        .map_err(|_| Error::Internal("Derived key has unexpected length".to_string()))?;
    Ok(DerivedKeyMaterial::from_bytes(bytes))
}
