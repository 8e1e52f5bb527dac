//! Zeroizing containers for keys and decrypted field data.
//!
//! This module provides:
//! - [`SecretBytes`]: fixed-size keys (stretched key, MAC key), wiped on drop
//! - [`SecretBuffer`]: variable-length heap secrets, wiped on drop and
//!   `mlock`ed when the platform allows it
//!
//! Neither type prints its contents through `Debug` or `Display`.

use crate::error::CryptoError;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Page locking
// ---------------------------------------------------------------------------

/// Keeps a heap region pinned in RAM until dropped.
///
/// Only constructed for heap allocations owned by [`SecretBuffer`], whose
/// address is stable for the lifetime of the buffer.
struct PinnedPages {
    ptr: *const u8,
    len: usize,
    pinned: bool,
}

// SAFETY: the pointer is only handed to mlock/munlock and never dereferenced.
unsafe impl Send for PinnedPages {}
unsafe impl Sync for PinnedPages {}

impl PinnedPages {
    fn pin(bytes: &[u8]) -> Self {
        let pinned = sys::mlock(bytes.as_ptr(), bytes.len());
        if !pinned && !bytes.is_empty() {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[keysafe-crypto-core] WARNING: mlock failed, \
                     decrypted data may reach swap (check RLIMIT_MEMLOCK)"
                );
            });
        }
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            pinned,
        }
    }
}

impl Drop for PinnedPages {
    fn drop(&mut self) {
        if self.pinned {
            sys::munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Variable-length secret held in a [`SecretSlice`].
///
/// `inner` drops first, so the bytes are wiped while still locked.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    pages: PinnedPages,
}

impl SecretBuffer {
    /// Copy `data` into a fresh pinned allocation.
    ///
    /// The caller remains responsible for wiping its own copy of `data`.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        let inner: SecretSlice<u8> = data.to_vec().into();
        let pages = PinnedPages::pin(inner.expose_secret());
        Self { inner, pages }
    }

    /// Take ownership of `data` without copying.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let inner: SecretSlice<u8> = data.into();
        let pages = PinnedPages::pin(inner.expose_secret());
        Self { inner, pages }
    }

    /// Borrow the secret bytes. Keep the borrow short.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// `true` when the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if the pages backing this buffer are locked in RAM.
    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.pages.pinned
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N>
// ---------------------------------------------------------------------------

/// Fixed-size key material, zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBytes<N> {
    /// Wrap `data`. The array is moved in, so no copy stays behind.
    #[must_use]
    pub const fn new(data: [u8; N]) -> Self {
        Self { bytes: data }
    }

    /// Build from a slice of exactly `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] on a length mismatch.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != N {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected {N} bytes, got {}",
                data.len()
            )));
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(data);
        Ok(Self { bytes })
    }

    /// Borrow the key bytes.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

// ---------------------------------------------------------------------------
// Platform shims
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod sys {
    pub(super) fn mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock only inspects the address range; failure is reported
        // through the return code.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: see `mlock`. A failed unlock is harmless.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }
}

#[cfg(not(unix))]
mod sys {
    pub(super) fn mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn munlock(_ptr: *const u8, _len: usize) {}
}
