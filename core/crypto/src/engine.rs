//! In-memory authenticated encryption (Encrypt-then-MAC).
//!
//! AES-256-CBC under the derived cipher key, then a truncated HMAC-SHA384
//! under the derived auth key over `ciphertext || iv || salt`. Decryption
//! verifies the tag in constant time before any ciphertext is decrypted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::aes_cbc;
use crate::compare::constant_time_eq;
use crate::config::EngineConfig;
use crate::container::{self, EncryptionMetadata, FrameMode};
use crate::kdf::derive_key_material;
use crate::keys::Salt;
use crate::mac::{compute_tag, TagHasher};
use crate::outcome::{DecryptionOutcome, EncryptionOutcome, Opened, Outcome, Sealed};
use cbcvault_common::{Error, Result, Secret, SensitiveBytes};

pub(crate) const AUTH_FAILED: &str =
    "Authentication failed, wrong password or data tampered with.";

/// Password-based authenticated encryption for byte buffers and strings.
///
/// Holds only immutable configuration, so one instance can serve
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct AuthenticatedCipher {
    config: EngineConfig,
}

impl AuthenticatedCipher {
    /// Create an engine with the given configuration.
    ///
    /// # Errors
    /// - Returns error if the configuration is invalid
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Encrypt a buffer, returning the container and its metadata.
    ///
    /// # Preconditions
    /// - `plaintext` and `secret` must not be empty
    ///
    /// # Postconditions
    /// - Embedded mode: container is `ciphertext || iv || salt || tag`
    /// - Detached mode: container is the ciphertext alone
    /// - Salt, IV and tag are returned in both modes
    pub fn try_encrypt(&self, plaintext: &[u8], secret: &Secret, mode: FrameMode) -> Result<Sealed> {
        if plaintext.is_empty() {
            return Err(Error::Validation("Data to encrypt required.".to_string()));
        }
        if secret.is_empty() {
            return Err(Error::Validation("Password required.".to_string()));
        }

        debug!(size = plaintext.len(), mode = ?mode, "Encrypting data");

        let salt = Salt::generate()?;
        let keys = derive_key_material(secret.as_bytes(), &salt, &self.config.kdf)?;

        let (ciphertext, iv) = aes_cbc::encrypt(keys.cipher_key(), plaintext)?;
        let tag = compute_tag(keys.auth_key(), &ciphertext, &iv, &salt)?;
        let metadata = EncryptionMetadata { iv, salt, tag };

        let container = match mode {
            FrameMode::Embedded => container::assemble(&ciphertext, &metadata),
            FrameMode::Detached => ciphertext,
        };

        Ok(Sealed {
            container,
            metadata,
        })
    }

    /// Authenticate and decrypt a container.
    ///
    /// `metadata` is `None` for embedded containers; detached containers
    /// must supply the IV, salt and tag returned at encryption time.
    ///
    /// # Errors
    /// - [`Error::Validation`] for empty input or secret
    /// - [`Error::TamperedData`] for embedded containers shorter than the
    ///   trailer, before any key derivation
    /// - [`Error::Authentication`] if the tag does not match; nothing is
    ///   decrypted in that case
    pub fn try_decrypt(
        &self,
        container: &[u8],
        secret: &Secret,
        metadata: Option<&EncryptionMetadata>,
    ) -> Result<Opened> {
        if container.is_empty() {
            return Err(Error::Validation("Data to decrypt required.".to_string()));
        }
        if secret.is_empty() {
            return Err(Error::Validation("Password required.".to_string()));
        }

        debug!(
            size = container.len(),
            detached = metadata.is_some(),
            "Decrypting data"
        );

        let (ciphertext, metadata, authenticated) = match metadata {
            Some(metadata) => (container, *metadata, None),
            None => {
                let view = container::split_embedded(container)?;
                (view.ciphertext, view.metadata, Some(view.authenticated))
            }
        };

        let keys = derive_key_material(secret.as_bytes(), &metadata.salt, &self.config.kdf)?;

        let expected = match authenticated {
            Some(region) => {
                let mut hasher = TagHasher::new(keys.auth_key())?;
                hasher.update(region);
                hasher.finalize()
            }
            None => compute_tag(keys.auth_key(), ciphertext, &metadata.iv, &metadata.salt)?,
        };

        if !constant_time_eq(expected.as_bytes(), metadata.tag.as_bytes())? {
            warn!("Tag mismatch while decrypting data");
            return Err(Error::Authentication(AUTH_FAILED.to_string()));
        }

        let plaintext = aes_cbc::decrypt(keys.cipher_key(), &metadata.iv, ciphertext)?;

        Ok(Opened {
            plaintext: SensitiveBytes::new(plaintext),
            metadata,
        })
    }

    /// Encrypt a buffer, reporting failures as an outcome.
    pub fn encrypt(&self, plaintext: &[u8], secret: &Secret, mode: FrameMode) -> EncryptionOutcome {
        Outcome::from_result(
            self.try_encrypt(plaintext, secret, mode),
            "Data encrypted successfully.",
        )
    }

    /// Decrypt a container, reporting failures as an outcome.
    pub fn decrypt(
        &self,
        container: &[u8],
        secret: &Secret,
        metadata: Option<&EncryptionMetadata>,
    ) -> DecryptionOutcome {
        Outcome::from_result(
            self.try_decrypt(container, secret, metadata),
            "Data decrypted successfully.",
        )
    }

    /// Decrypt a detached container from loose metadata parts.
    ///
    /// Any missing or malformed part fails validation.
    pub fn decrypt_detached(
        &self,
        ciphertext: &[u8],
        secret: &Secret,
        iv: Option<&[u8]>,
        salt: Option<&[u8]>,
        tag: Option<&[u8]>,
    ) -> DecryptionOutcome {
        let result = EncryptionMetadata::from_parts(iv, salt, tag)
            .and_then(|metadata| self.try_decrypt(ciphertext, secret, Some(&metadata)));
        Outcome::from_result(result, "Data decrypted successfully.")
    }

    /// Encrypt UTF-8 text under a text password.
    ///
    /// The container is available as base64 via [`Sealed::to_base64`].
    pub fn encrypt_text(&self, text: &str, password: &str, mode: FrameMode) -> EncryptionOutcome {
        let secret = Secret::from(password);
        Outcome::from_result(
            self.try_encrypt(text.as_bytes(), &secret, mode),
            "String encrypted successfully.",
        )
    }

    /// Decrypt a base64-encoded container under a text password.
    pub fn decrypt_base64(
        &self,
        encoded: &str,
        password: &str,
        metadata: Option<&EncryptionMetadata>,
    ) -> DecryptionOutcome {
        let secret = Secret::from(password);
        let result = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Validation(format!("Invalid base64 input: {}", e)))
            .and_then(|container| self.try_decrypt(&container, &secret, metadata));
        Outcome::from_result(result, "String decrypted successfully.")
    }
}

impl Default for AuthenticatedCipher {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{MIN_EMBEDDED_LENGTH, TRAILER_LENGTH};
    use crate::keys::{IV_LENGTH, SALT_LENGTH};
    use cbcvault_common::ErrorKind;
    use proptest::prelude::*;

    fn engine() -> AuthenticatedCipher {
        AuthenticatedCipher::new(EngineConfig::new().with_kdf_iterations(1_000)).unwrap()
    }

    fn secret() -> Secret {
        Secret::from("correct horse battery staple")
    }

    #[test]
    fn test_embedded_roundtrip() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"Hello, World!", &secret(), FrameMode::Embedded)
            .unwrap();

        let opened = engine.try_decrypt(&sealed.container, &secret(), None).unwrap();

        assert_eq!(opened.plaintext.as_bytes(), b"Hello, World!");
        assert_eq!(opened.metadata, sealed.metadata);
    }

    #[test]
    fn test_embedded_layout() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"layout check", &secret(), FrameMode::Embedded)
            .unwrap();

        let c = &sealed.container;
        let n = c.len();
        assert_eq!(n, 16 + TRAILER_LENGTH);
        assert_eq!(&c[n - 24..], sealed.tag().as_bytes());
        assert_eq!(&c[n - 40..n - 24], sealed.salt().as_bytes());
        assert_eq!(&c[n - 56..n - 40], sealed.iv().as_bytes());
    }

    #[test]
    fn test_detached_roundtrip() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"detached payload", &secret(), FrameMode::Detached)
            .unwrap();

        assert_eq!(sealed.container.len(), 32);

        let outcome = engine.decrypt_detached(
            &sealed.container,
            &secret(),
            Some(sealed.iv().as_bytes()),
            Some(sealed.salt().as_bytes()),
            Some(sealed.tag().as_bytes()),
        );
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(
            outcome.payload.unwrap().plaintext.as_bytes(),
            b"detached payload"
        );
    }

    #[test]
    fn test_detached_and_embedded_share_tag_scope() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"same tag", &secret(), FrameMode::Detached)
            .unwrap();

        // The detached parts reassembled into an embedded container verify.
        let embedded = container::assemble(&sealed.container, &sealed.metadata);
        assert!(engine.try_decrypt(&embedded, &secret(), None).is_ok());
    }

    #[test]
    fn test_detached_missing_metadata_fails_validation() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"detached payload", &secret(), FrameMode::Detached)
            .unwrap();
        let iv = sealed.iv().as_bytes();
        let salt = sealed.salt().as_bytes();
        let tag = sealed.tag().as_bytes();

        let cases = [
            (None, Some(&salt[..]), Some(&tag[..])),
            (Some(&iv[..]), None, Some(&tag[..])),
            (Some(&iv[..]), Some(&salt[..]), None),
        ];
        for (iv, salt, tag) in cases {
            let outcome = engine.decrypt_detached(&sealed.container, &secret(), iv, salt, tag);
            assert!(!outcome.success);
            assert_eq!(outcome.kind, Some(ErrorKind::Validation));
        }
    }

    #[test]
    fn test_empty_inputs_fail_validation() {
        let engine = engine();

        let outcome = engine.encrypt(b"", &secret(), FrameMode::Embedded);
        assert_eq!(outcome.kind, Some(ErrorKind::Validation));
        assert_eq!(outcome.message, "Data to encrypt required.");

        let outcome = engine.encrypt(b"data", &Secret::from(""), FrameMode::Embedded);
        assert_eq!(outcome.kind, Some(ErrorKind::Validation));
        assert_eq!(outcome.message, "Password required.");

        let outcome = engine.decrypt(b"", &secret(), None);
        assert_eq!(outcome.kind, Some(ErrorKind::Validation));

        let outcome = engine.decrypt(&[0u8; 100], &Secret::from(""), None);
        assert_eq!(outcome.kind, Some(ErrorKind::Validation));
    }

    #[test]
    fn test_short_container_is_tampered() {
        let engine = engine();
        let outcome = engine.decrypt(&[0u8; MIN_EMBEDDED_LENGTH - 1], &secret(), None);

        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::TamperedData));
    }

    #[test]
    fn test_short_container_checked_before_key_derivation() {
        // An engine whose KDF would be unusably slow still answers at once.
        let engine = AuthenticatedCipher::new(
            EngineConfig::new().with_kdf_iterations(u32::MAX),
        )
        .unwrap();
        let outcome = engine.decrypt(&[1u8; 10], &secret(), None);
        assert_eq!(outcome.kind, Some(ErrorKind::TamperedData));
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"secret data", &secret(), FrameMode::Embedded)
            .unwrap();

        let outcome = engine.decrypt(&sealed.container, &Secret::from("wrong"), None);

        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::Authentication));
        assert_eq!(outcome.message, AUTH_FAILED);
        assert!(outcome.payload.is_none());
    }

    #[test]
    fn test_every_byte_is_authenticated() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"tamper with me", &secret(), FrameMode::Embedded)
            .unwrap();

        for i in 0..sealed.container.len() {
            let mut tampered = sealed.container.clone();
            tampered[i] ^= 0x01;
            let outcome = engine.decrypt(&tampered, &secret(), None);
            assert_eq!(
                outcome.kind,
                Some(ErrorKind::Authentication),
                "byte {} not authenticated",
                i
            );
        }
    }

    #[test]
    fn test_corrupted_salt_reports_authentication() {
        let engine = engine();
        let sealed = engine
            .try_encrypt(b"salted", &secret(), FrameMode::Embedded)
            .unwrap();

        let mut tampered = sealed.container.clone();
        let salt_start = tampered.len() - TRAILER_LENGTH + IV_LENGTH;
        tampered[salt_start + SALT_LENGTH / 2] ^= 0xFF;

        let outcome = engine.decrypt(&tampered, &secret(), None);
        assert_eq!(outcome.kind, Some(ErrorKind::Authentication));
    }

    #[test]
    fn test_text_base64_roundtrip() {
        let engine = engine();
        let sealed = engine
            .encrypt_text("Grüße, world", "pässwörd", FrameMode::Embedded)
            .payload
            .unwrap();

        let outcome = engine.decrypt_base64(&sealed.to_base64(), "pässwörd", None);
        assert!(outcome.success);
        assert_eq!(outcome.payload.unwrap().text(), Some("Grüße, world"));
    }

    #[test]
    fn test_invalid_base64_fails_validation() {
        let outcome = engine().decrypt_base64("%%% not base64 %%%", "pw", None);
        assert_eq!(outcome.kind, Some(ErrorKind::Validation));
    }

    #[test]
    fn test_fresh_salt_and_iv_per_encryption() {
        let engine = engine();
        let a = engine.try_encrypt(b"same", &secret(), FrameMode::Embedded).unwrap();
        let b = engine.try_encrypt(b"same", &secret(), FrameMode::Embedded).unwrap();

        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.container, b.container);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(AuthenticatedCipher::new(EngineConfig::new().with_chunk_size(3)).is_err());
    }

    #[test]
    fn test_default_iterations_roundtrip() {
        let engine = AuthenticatedCipher::default();
        let sealed = engine
            .try_encrypt(b"standard", &secret(), FrameMode::Embedded)
            .unwrap();
        let opened = engine.try_decrypt(&sealed.container, &secret(), None).unwrap();
        assert_eq!(opened.plaintext.as_bytes(), b"standard");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip_both_modes(
            plaintext in proptest::collection::vec(any::<u8>(), 1..2048),
            password in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let engine = engine();
            let secret = Secret::from(password);

            let sealed = engine.try_encrypt(&plaintext, &secret, FrameMode::Embedded).unwrap();
            let opened = engine.try_decrypt(&sealed.container, &secret, None).unwrap();
            prop_assert_eq!(opened.plaintext.as_bytes(), &plaintext[..]);

            let sealed = engine.try_encrypt(&plaintext, &secret, FrameMode::Detached).unwrap();
            let opened = engine
                .try_decrypt(&sealed.container, &secret, Some(&sealed.metadata))
                .unwrap();
            prop_assert_eq!(opened.plaintext.as_bytes(), &plaintext[..]);
        }

        #[test]
        fn prop_wrong_secret_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            suffix in 1u8..=255,
        ) {
            let engine = engine();
            let sealed = engine.try_encrypt(&plaintext, &secret(), FrameMode::Embedded).unwrap();

            let mut wrong = secret().as_bytes().to_vec();
            wrong.push(suffix);
            let result = engine.try_decrypt(&sealed.container, &Secret::from(wrong), None);
            prop_assert!(matches!(result, Err(Error::Authentication(_))));
        }
    }
}
