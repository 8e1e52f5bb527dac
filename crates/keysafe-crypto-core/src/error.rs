//! Cryptographic error types for `keysafe-crypto-core`.

use thiserror::Error;

/// Errors produced by cipher, chaining and key-stretching operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key stretching rejected its inputs (iteration floor, empty salt).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid key material (wrong length for the selected cipher).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Block cipher misuse: a buffer that is not a whole number of blocks.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// The underlying byte source ended before a full block run was read.
    #[error("truncated stream: expected {expected} bytes, got {actual}")]
    TruncatedStream {
        /// Bytes the caller asked for (rounded to whole blocks).
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// I/O failure on the underlying sink or source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
