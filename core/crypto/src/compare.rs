//! Constant-time comparison of authentication tags.

use subtle::ConstantTimeEq;

use cbcvault_common::{Error, Result};

/// Compare two byte strings without short-circuiting on the first difference.
///
/// Every byte pair is XORed into an accumulator; the result is true iff the
/// accumulator ends at zero.
///
/// # Errors
/// - Returns a validation error if the lengths differ. The length check itself
///   is not timing hardened; tag lengths are public.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> Result<bool> {
    if a.len() != b.len() {
        return Err(Error::Validation(format!(
            "Compared values must have equal length ({} != {})",
            a.len(),
            b.len()
        )));
    }

    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));

    Ok(bool::from(diff.ct_eq(&0u8)))
}
