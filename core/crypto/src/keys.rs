//! Key and framing value types with secure memory handling.
//!
//! Key types automatically zeroize their memory on drop. Salt, IV and tag
//! are public values and are plain byte arrays.

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cbcvault_common::{Error, Result};

/// Length of the cipher and authentication keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the derived key material: cipher key followed by auth key.
pub const DERIVED_KEY_LENGTH: usize = KEY_LENGTH * 2;

/// Salt length in bytes (128-bit).
pub const SALT_LENGTH: usize = 16;

/// AES block and IV length in bytes (128-bit).
pub const IV_LENGTH: usize = 16;

/// Truncated authentication tag length in bytes (192-bit).
pub const TAG_LENGTH: usize = 24;

/// Fill an array from the OS random source.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Internal(format!("Random source failed: {}", e)))?;
    Ok(bytes)
}

macro_rules! public_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Create from bytes.
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Create from a slice, checking its length.
            ///
            /// # Errors
            /// - Returns a validation error if the slice has the wrong length
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let array: [u8; $len] = bytes.try_into().map_err(|_| {
                    Error::Validation(format!(
                        "{} must be {} bytes, got {}",
                        $label,
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(Self(array))
            }

            /// Get the bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

public_bytes!(
    /// Salt for key derivation, fresh for every encryption.
    Salt,
    SALT_LENGTH,
    "Salt"
);

public_bytes!(
    /// CBC initialization vector, fresh for every encryption.
    Iv,
    IV_LENGTH,
    "IV"
);

public_bytes!(
    /// Truncated HMAC-SHA384 authentication tag.
    Tag,
    TAG_LENGTH,
    "Tag"
);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Result<Self> {
        random_array().map(Self)
    }
}

impl Iv {
    /// Generate a random IV.
    pub fn generate() -> Result<Self> {
        random_array().map(Self)
    }
}

/// Key for the block cipher.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LENGTH],
}

impl CipherKey {
    /// Create a cipher key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

/// Key for the message authentication code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey {
    key: [u8; KEY_LENGTH],
}

impl AuthKey {
    /// Create an authentication key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey([REDACTED])")
    }
}

/// Key material derived from a password and salt.
///
/// The first half of the derived bytes keys the cipher, the second half
/// keys the MAC. Both halves are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeyMaterial {
    cipher_key: CipherKey,
    auth_key: AuthKey,
}

impl DerivedKeyMaterial {
    /// Split raw derived bytes into the cipher and authentication keys.
    pub fn from_bytes(bytes: &[u8; DERIVED_KEY_LENGTH]) -> Self {
        let mut cipher_key = [0u8; KEY_LENGTH];
        let mut auth_key = [0u8; KEY_LENGTH];
        cipher_key.copy_from_slice(&bytes[..KEY_LENGTH]);
        auth_key.copy_from_slice(&bytes[KEY_LENGTH..]);

        let material = Self {
            cipher_key: CipherKey::from_bytes(cipher_key),
            auth_key: AuthKey::from_bytes(auth_key),
        };
        cipher_key.zeroize();
        auth_key.zeroize();
        material
    }

    /// Key for the block cipher.
    pub fn cipher_key(&self) -> &CipherKey {
        &self.cipher_key
    }

    /// Key for the MAC.
    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }
}

impl fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKeyMaterial([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate().unwrap();
        let salt2 = Salt::generate().unwrap();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_iv_generate() {
        let iv1 = Iv::generate().unwrap();
        let iv2 = Iv::generate().unwrap();

        assert_ne!(iv1, iv2);
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(Salt::from_slice(&[0u8; SALT_LENGTH]).is_ok());
        assert!(Iv::from_slice(&[0u8; IV_LENGTH + 1]).is_err());

        let err = Tag::from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("Tag must be 24 bytes"));
    }

    #[test]
    fn test_derived_key_material_split() {
        let mut raw = [0u8; DERIVED_KEY_LENGTH];
        raw[..KEY_LENGTH].fill(1);
        raw[KEY_LENGTH..].fill(2);

        let material = DerivedKeyMaterial::from_bytes(&raw);

        assert_eq!(material.cipher_key().as_bytes(), &[1u8; KEY_LENGTH]);
        assert_eq!(material.auth_key().as_bytes(), &[2u8; KEY_LENGTH]);
    }

    #[test]
    fn test_key_debug_redacted() {
        let material = DerivedKeyMaterial::from_bytes(&[9u8; DERIVED_KEY_LENGTH]);
        assert_eq!(format!("{:?}", material), "DerivedKeyMaterial([REDACTED])");
        assert_eq!(format!("{:?}", material.cipher_key()), "CipherKey([REDACTED])");
    }
}
