//! Error types for `keysafe-db`.

use std::path::PathBuf;

use keysafe_crypto_core::CryptoError;
use thiserror::Error;

use crate::history::HistoryError;

/// Errors produced by container, codec, locking and encryptor operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(CryptoError),

    /// The passphrase does not match the stored verifier.
    #[error("wrong passphrase")]
    WrongPassword,

    /// The file does not carry the layout of the requested version.
    #[error("file is not in the requested format")]
    NotThisFormat,

    /// The database file could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    CantOpenFile {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an already-open file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than a whole block run were available.
    #[error("truncated stream: expected {expected} bytes, got {actual}")]
    TruncatedStream {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Structural violation inside a record.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// A field length exceeds the configured ceiling.
    #[error("field length {length} exceeds limit {limit}")]
    MalformedLength {
        /// Length read from the field prefix.
        length: u64,
        /// Ceiling in force for this container.
        limit: u64,
    },

    /// The sidecar lock already exists.
    #[error("database is locked by {holder}")]
    AlreadyLocked {
        /// Contents of the existing sidecar (`user@host:pid`).
        holder: String,
    },

    /// The authentication tag at end of file does not match the records.
    #[error("integrity check failed: file has been modified or damaged")]
    IntegrityMismatch,

    /// Header declares a major version this build cannot read.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version from the header.
        major: u8,
        /// Minor version from the header.
        minor: u8,
    },

    /// Stored iteration count is below the accepted floor.
    #[error("iteration count {0} is below the accepted minimum")]
    InvalidIterations(u32),

    /// Read requested on a write container or vice versa.
    #[error("operation not allowed in this container mode")]
    WrongMode,

    /// Operation on a container that has already been closed.
    #[error("container is closed")]
    Closed,

    /// A previous write failed; the container accepts no further writes.
    #[error("container is poisoned by an earlier write failure")]
    Poisoned,

    /// Password history could not be encoded.
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl From<CryptoError> for DbError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Io(e) => Self::Io(e),
            CryptoError::TruncatedStream { expected, actual } => {
                Self::TruncatedStream { expected, actual }
            }
            other => Self::Crypto(other),
        }
    }
}
