//! Password-based authenticated encryption for CbcVault.
//!
//! This crate provides:
//! - Key derivation using PBKDF2-HMAC-SHA256, split into cipher and MAC keys
//! - AES-256-CBC encryption with PKCS#7 padding
//! - Encrypt-then-MAC with a truncated HMAC-SHA384 tag
//! - In-memory and streaming file engines sharing one container layout
//! - Keyed file signatures
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Tags are compared in constant time and checked before any decryption

pub mod aes_cbc;
pub mod compare;
pub mod config;
pub mod container;
pub mod engine;
pub mod file;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod outcome;
pub mod progress;
pub mod signature;
pub mod stream;

pub use compare::constant_time_eq;
pub use config::EngineConfig;
pub use container::{EncryptionMetadata, FrameMode};
pub use engine::AuthenticatedCipher;
pub use file::FileCipher;
pub use kdf::{derive_key_material, KdfParams};
pub use keys::{AuthKey, CipherKey, DerivedKeyMaterial, Iv, Salt, Tag};
pub use outcome::{
    DecryptionOutcome, EncryptionOutcome, FileOutcome, FileReport, Opened, Outcome, Sealed,
};
pub use progress::{NoProgress, ProgressListener};
pub use stream::{DecryptingStream, EncryptingStream};
