//! Constant-time comparisons
//!
//! Signature checks go through these helpers so that a mismatch takes the
//! same time wherever the first differing byte is.

use subtle::ConstantTimeEq;

/// Constant-time byte comparison. Length is not secret.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time string comparison (for encoded signatures)
pub fn constant_time_str_compare(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
