//! Common utilities and types shared across CbcVault modules.
//!
//! This module provides the error taxonomy used by every operation and the
//! zero-on-drop buffer types that carry passwords and decrypted data.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{Secret, SensitiveBytes};
