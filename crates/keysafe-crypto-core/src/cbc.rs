//! Cipher-block chaining over a [`BlockCipher`].
//!
//! This module provides:
//! - [`CbcChain`]: in-memory CBC over block-aligned buffers
//! - [`write_chained`]: pad, encrypt and emit a buffer to a byte sink
//! - [`read_chained`]: read whole blocks from a byte source and decrypt them
//!
//! The chain value carries across calls, so a sequence of fields written
//! with the same [`CbcChain`] forms one continuous CBC stream.

use std::io::{ErrorKind, Read, Write};

use zeroize::{Zeroize, Zeroizing};

use crate::cipher::BlockCipher;
use crate::error::CryptoError;

/// A keyed cipher plus its running chain value.
pub struct CbcChain {
    cipher: BlockCipher,
    chain: Zeroizing<Vec<u8>>,
}

impl CbcChain {
    /// Start a chain seeded with `iv`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Cipher`] if `iv` is not one block long.
    pub fn new(cipher: BlockCipher, iv: &[u8]) -> Result<Self, CryptoError> {
        if iv.len() != cipher.block_len() {
            return Err(CryptoError::Cipher(format!(
                "IV must be {} bytes, got {}",
                cipher.block_len(),
                iv.len()
            )));
        }
        Ok(Self {
            cipher,
            chain: Zeroizing::new(iv.to_vec()),
        })
    }

    /// Block size of the underlying cipher.
    #[must_use]
    pub const fn block_len(&self) -> usize {
        self.cipher.block_len()
    }

    /// Number of bytes `len` occupies once padded to whole blocks.
    ///
    /// A zero-length payload still occupies one block.
    #[must_use]
    pub fn padded_len(&self, len: usize) -> usize {
        let bs = self.block_len();
        let blocks = len.div_ceil(bs).max(1);
        blocks.saturating_mul(bs)
    }

    /// Encrypt `buf` in place. `buf` must be a whole number of blocks.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Cipher`] if `buf` is not block-aligned.
    pub fn encrypt_blocks(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf.len())?;
        let bs = self.block_len();
        for block in buf.chunks_exact_mut(bs) {
            for (b, c) in block.iter_mut().zip(self.chain.iter()) {
                *b ^= c;
            }
            self.cipher.encrypt_block(block)?;
            self.chain.copy_from_slice(block);
        }
        Ok(())
    }

    /// Decrypt `buf` in place. `buf` must be a whole number of blocks.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Cipher`] if `buf` is not block-aligned.
    pub fn decrypt_blocks(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.check_aligned(buf.len())?;
        let bs = self.block_len();
        let mut saved = Zeroizing::new(vec![0u8; bs]);
        for block in buf.chunks_exact_mut(bs) {
            saved.copy_from_slice(block);
            self.cipher.decrypt_block(block)?;
            for (b, c) in block.iter_mut().zip(self.chain.iter()) {
                *b ^= c;
            }
            self.chain.copy_from_slice(&saved);
        }
        Ok(())
    }

    fn check_aligned(&self, len: usize) -> Result<(), CryptoError> {
        if len.checked_rem(self.block_len()) == Some(0) {
            Ok(())
        } else {
            Err(CryptoError::Cipher(format!(
                "buffer of {len} bytes is not a multiple of the {}-byte block",
                self.block_len()
            )))
        }
    }
}

impl std::fmt::Debug for CbcChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcChain")
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

/// Zero-pad `data` to whole blocks, encrypt it and write it to `sink`.
///
/// Returns the number of bytes written. An empty `data` still emits one
/// block. The true length must be recorded out of band by the caller.
///
/// # Errors
///
/// Returns [`CryptoError::Io`] if the sink fails.
pub fn write_chained<W: Write + ?Sized>(
    sink: &mut W,
    chain: &mut CbcChain,
    data: &[u8],
) -> Result<usize, CryptoError> {
    let mut buf = Zeroizing::new(vec![0u8; chain.padded_len(data.len())]);
    buf[..data.len()].copy_from_slice(data);
    chain.encrypt_blocks(&mut buf)?;
    sink.write_all(&buf)?;
    Ok(buf.len())
}

/// Read `len` bytes rounded up to whole blocks from `source` and decrypt them.
///
/// The returned buffer keeps the padding; callers trim to their recorded
/// length.
///
/// # Errors
///
/// - [`CryptoError::TruncatedStream`] if the source ends early
/// - [`CryptoError::Io`] on any other read failure
pub fn read_chained<R: Read + ?Sized>(
    source: &mut R,
    chain: &mut CbcChain,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let want = chain.padded_len(len);
    let mut buf = Zeroizing::new(vec![0u8; want]);
    let got = read_full(source, &mut buf)?;
    if got < want {
        buf.zeroize();
        return Err(CryptoError::TruncatedStream {
            expected: want,
            actual: got,
        });
    }
    chain.decrypt_blocks(&mut buf)?;
    Ok(buf)
}

/// Like `read_exact`, but reports how far it got instead of failing on EOF.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize, CryptoError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled = filled.saturating_add(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(CryptoError::Io(e)),
        }
    }
    Ok(filled)
}
