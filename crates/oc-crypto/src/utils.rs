//! Constant-time comparison helpers.
//!
//! Relay passwords are compared with these so that the time taken does not
//! depend on how many leading bytes of a guess were correct.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
///
/// ```rust
/// use oc_crypto::utils::constant_time_compare;
///
/// assert!(constant_time_compare(b"hunter2", b"hunter2"));
/// assert!(!constant_time_compare(b"hunter2", b"hunter3"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Check a caller-supplied password against the configured one.
///
/// A missing password never matches, and neither does an empty one.
pub fn passwords_match(supplied: Option<&str>, expected: &str) -> bool {
    match supplied {
        Some(supplied) if !expected.is_empty() => {
            constant_time_compare(supplied.as_bytes(), expected.as_bytes())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(&[0u8; 64], &[0u8; 64]));
        assert!(!constant_time_compare(&[0u8; 64], &[1u8; 64]));
        assert!(!constant_time_compare(&[0u8; 32], &[0u8; 64]));
        assert!(constant_time_compare(&[], &[]));
    }

    #[test]
    fn test_passwords_match() {
        assert!(passwords_match(Some("hunter2"), "hunter2"));
        assert!(!passwords_match(Some("hunter"), "hunter2"));
        assert!(!passwords_match(None, "hunter2"));
        assert!(!passwords_match(Some(""), ""));
    }
}
