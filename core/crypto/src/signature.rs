//! Keyed file signatures.
//!
//! A signed file is `signature || contents`, where the signature is the full
//! HMAC-SHA256 of the contents.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tempfile::Builder;
use tracing::{debug, warn};

use crate::compare::constant_time_eq;
use crate::progress::{percent, ProgressListener};
use crate::stream::{read_full, validate_chunk_size, DEFAULT_CHUNK_SIZE};
use cbcvault_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of a file signature in bytes.
pub const SIGNATURE_LENGTH: usize = 32;

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::NotFound(format!(
            "File \"{}\" not found.",
            path.display()
        )));
    }
    Ok(())
}

/// HMAC-SHA256 of a file, skipping its first `skip` bytes.
///
/// # Errors
/// - [`Error::Validation`] for an empty key
/// - [`Error::NotFound`] if the file does not exist
pub fn file_signature(path: &Path, key: &[u8], skip: u64) -> Result<[u8; SIGNATURE_LENGTH]> {
    if key.is_empty() {
        return Err(Error::Validation("Signature key required.".to_string()));
    }
    ensure_exists(path)?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;

    let mut file = File::open(path)?;
    file.lock_shared()?;
    file.seek(SeekFrom::Start(skip))?;

    let mut buffer = vec![0u8; DEFAULT_CHUNK_SIZE];
    loop {
        let n = read_full(&mut file, &mut buffer)?;
        mac.update(&buffer[..n]);
        if n < buffer.len() {
            break;
        }
    }

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    Ok(signature)
}

/// Rewrite `path` as `signature || contents`.
///
/// The new file is staged next to the original and renamed over it, so a
/// failure leaves the original untouched.
pub fn prepend_signature(
    path: &Path,
    signature: &[u8],
    chunk_size: usize,
    progress: &dyn ProgressListener,
) -> Result<()> {
    if signature.is_empty() {
        return Err(Error::Validation("Signature required.".to_string()));
    }
    validate_chunk_size(chunk_size)?;
    ensure_exists(path)?;

    let mut source = File::open(path)?;
    source.lock_shared()?;
    let total = source.metadata()?.len();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = Builder::new()
        .prefix(".cbcvault-")
        .suffix(".signed")
        .tempfile_in(dir)?;
    staging.as_file().lock()?;

    let out = staging.as_file_mut();
    out.write_all(signature)?;

    let mut buffer = vec![0u8; chunk_size];
    let mut done = 0u64;
    loop {
        let n = read_full(&mut source, &mut buffer)?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
        done += n as u64;
        progress.on_progress(percent(done, total), "Signing file...");
    }
    drop(source);

    out.sync_all()?;
    staging.persist(path).map_err(|e| Error::Io(e.error))?;
    progress.on_progress(100, "File signed.");

    debug!(path = %path.display(), size = total, "Signature prepended");
    Ok(())
}

/// Sign a file in place and return the signature.
pub fn sign_file(
    path: &Path,
    key: &[u8],
    chunk_size: usize,
    progress: &dyn ProgressListener,
) -> Result<[u8; SIGNATURE_LENGTH]> {
    let signature = file_signature(path, key, 0)?;
    prepend_signature(path, &signature, chunk_size, progress)?;
    Ok(signature)
}

/// Read `len` bytes starting at `offset`.
///
/// # Errors
/// - [`Error::Validation`] for a zero length
/// - [`Error::NotFound`] if the file does not exist
/// - [`Error::TamperedData`] if the file ends before `offset + len`
pub fn read_file_range(path: &Path, len: usize, offset: u64) -> Result<Vec<u8>> {
    if len == 0 {
        return Err(Error::Validation("Length must be positive.".to_string()));
    }
    ensure_exists(path)?;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut data = vec![0u8; len];
    let n = read_full(&mut file, &mut data)?;
    if n < len {
        return Err(Error::TamperedData(format!(
            "Expected {} bytes at offset {}, file has {}.",
            len, offset, n
        )));
    }
    Ok(data)
}

/// Check the signature at the start of a signed file.
///
/// Returns `Ok(false)` on a mismatch.
pub fn verify_signed_file(path: &Path, key: &[u8]) -> Result<bool> {
    if key.is_empty() {
        return Err(Error::Validation("Signature key required.".to_string()));
    }
    let stored = read_file_range(path, SIGNATURE_LENGTH, 0)?;
    let computed = file_signature(path, key, SIGNATURE_LENGTH as u64)?;

    let matches = constant_time_eq(&stored, &computed)?;
    if !matches {
        warn!(path = %path.display(), "File signature mismatch");
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const KEY: &[u8] = b"signing key";

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_signature_matches_hmac() {
        let dir = TempDir::new().unwrap();
        let data = vec![0x5au8; 10_000];
        let path = write_file(&dir, "data.bin", &data);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(KEY).unwrap();
        mac.update(&data);
        let expected = mac.finalize().into_bytes();

        assert_eq!(file_signature(&path, KEY, 0).unwrap()[..], expected[..]);
    }

    #[test]
    fn test_signature_skips_prefix() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"HEADERpayload");
        let b = write_file(&dir, "b", b"payload");

        assert_eq!(
            file_signature(&a, KEY, 6).unwrap(),
            file_signature(&b, KEY, 0).unwrap()
        );
    }

    #[test]
    fn test_signature_at_chunk_boundaries() {
        let dir = TempDir::new().unwrap();
        for len in [0, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE * 2 + 1] {
            let data: Vec<u8> = (0..len).map(|i| (i % 241) as u8).collect();
            let path = write_file(&dir, "boundary.bin", &data);

            let mut mac = <HmacSha256 as Mac>::new_from_slice(KEY).unwrap();
            mac.update(&data);
            let expected = mac.finalize().into_bytes();

            assert_eq!(
                file_signature(&path, KEY, 0).unwrap()[..],
                expected[..],
                "length {}",
                len
            );
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "doc.txt", b"signed contents");

        let signature = sign_file(&path, KEY, 4096, &NoProgress).unwrap();

        let contents = fs::read(&path).unwrap();
        assert_eq!(&contents[..SIGNATURE_LENGTH], &signature[..]);
        assert_eq!(&contents[SIGNATURE_LENGTH..], b"signed contents");
        assert!(verify_signed_file(&path, KEY).unwrap());
        assert!(!verify_signed_file(&path, b"other key").unwrap());
    }

    #[test]
    fn test_tampered_signed_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "doc.txt", b"signed contents");
        sign_file(&path, KEY, 4096, &NoProgress).unwrap();

        let mut contents = fs::read(&path).unwrap();
        let last = contents.len() - 1;
        contents[last] ^= 1;
        fs::write(&path, contents).unwrap();

        assert!(!verify_signed_file(&path, KEY).unwrap());
    }

    #[test]
    fn test_prepend_reports_progress() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "big.bin", &vec![1u8; 20_000]);
        let events = std::cell::RefCell::new(Vec::new());
        let listener = |p: u8, m: &str| events.borrow_mut().push((p, m.to_string()));

        prepend_signature(&path, &[7u8; SIGNATURE_LENGTH], 4096, &listener).unwrap();

        let events = events.into_inner();
        assert!(events.len() > 1);
        assert_eq!(events.last().unwrap(), &(100, "File signed.".to_string()));
        assert_eq!(fs::metadata(&path).unwrap().len(), 20_000 + 32);
    }

    #[test]
    fn test_read_file_range() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "range.bin", b"0123456789");

        assert_eq!(read_file_range(&path, 3, 4).unwrap(), b"456");
        assert!(matches!(
            read_file_range(&path, 0, 0),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            read_file_range(&path, 5, 8),
            Err(Error::TamperedData(_))
        ));
    }

    #[test]
    fn test_missing_file_and_empty_key() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let present = write_file(&dir, "present", b"x");

        assert!(matches!(
            file_signature(&missing, KEY, 0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            verify_signed_file(&missing, KEY),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            file_signature(&present, b"", 0),
            Err(Error::Validation(_))
        ));
    }
}
