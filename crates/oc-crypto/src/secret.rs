//! Scoped secret buffers.
//!
//! Every piece of key material handled by this crate (signing seeds, exchange
//! secrets, DH outputs used as AEAD keys) lives in a [`ScopedSecret`]. The
//! buffer is overwritten with zeros when it is dropped, which covers normal
//! returns, `?` early returns and unwinding alike.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fixed-size secret bytes, wiped on drop.
pub struct ScopedSecret<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> ScopedSecret<N> {
    /// An all-zero buffer, to be filled in place via [`ScopedSecret::expose_mut`].
    pub fn zeroed() -> Self {
        Self { bytes: [0u8; N] }
    }

    /// Copy `bytes` into a new guarded buffer.
    pub fn copy_from(bytes: &[u8; N]) -> Self {
        let mut secret = Self::zeroed();
        secret.bytes.copy_from_slice(bytes);
        secret
    }

    /// Copy a slice of exactly `N` bytes into a new guarded buffer.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != N {
            return None;
        }
        let mut secret = Self::zeroed();
        secret.bytes.copy_from_slice(bytes);
        Some(secret)
    }

    pub fn expose(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn expose_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }
}

impl<const N: usize> Clone for ScopedSecret<N> {
    fn clone(&self) -> Self {
        Self::copy_from(&self.bytes)
    }
}

impl<const N: usize> Zeroize for ScopedSecret<N> {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl<const N: usize> Drop for ScopedSecret<N> {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl<const N: usize> ZeroizeOnDrop for ScopedSecret<N> {}

impl<const N: usize> fmt::Debug for ScopedSecret<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopedSecret<{}>([REDACTED])", N)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_preserves_bytes() {
        let secret = ScopedSecret::copy_from(&[7u8; 32]);
        assert_eq!(secret.expose(), &[7u8; 32]);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(ScopedSecret::<32>::from_slice(&[1u8; 31]).is_none());
        assert!(ScopedSecret::<32>::from_slice(&[1u8; 33]).is_none());
        assert!(ScopedSecret::<32>::from_slice(&[1u8; 32]).is_some());
    }

    #[test]
    fn test_zeroize_clears_buffer() {
        let mut secret = ScopedSecret::copy_from(&[0xAAu8; 16]);
        secret.zeroize();
        assert_eq!(secret.expose(), &[0u8; 16]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = ScopedSecret::copy_from(&[0x42u8; 32]);
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn test_is_zeroize_on_drop() {
        fn assert_zeroize_on_drop<T: ZeroizeOnDrop>() {}
        assert_zeroize_on_drop::<ScopedSecret<32>>();
    }
}
