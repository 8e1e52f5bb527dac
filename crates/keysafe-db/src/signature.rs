//! File signatures for detecting outside modification.
//!
//! A signature is the file length plus the SHA-256 of its contents. Files
//! over [`FULL_HASH_LIMIT`] bytes are hashed over their first and last
//! [`EDGE_LEN`] bytes only, which is enough to notice a re-save.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ring::digest::{Context, SHA256};

use crate::error::DbError;

/// Largest file hashed in full.
pub const FULL_HASH_LIMIT: u64 = 2048;

/// Bytes hashed from each end of a larger file.
pub const EDGE_LEN: usize = 1024;

/// Length and content digest of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    /// File length in bytes.
    pub length: u64,
    /// SHA-256 of the whole file, or of its head and tail.
    pub digest: [u8; 32],
}

impl FileSignature {
    /// Signature of the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`DbError::CantOpenFile`] if the file cannot be opened
    /// - [`DbError::Io`] if reading fails
    pub fn of(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let cant_open = |source| DbError::CantOpenFile {
            path: PathBuf::from(path),
            source,
        };
        let mut file = File::open(path).map_err(cant_open)?;
        let length = file.metadata().map_err(cant_open)?.len();

        let mut ctx = Context::new(&SHA256);
        if length <= FULL_HASH_LIMIT {
            let mut all = Vec::new();
            file.read_to_end(&mut all)?;
            ctx.update(&all);
        } else {
            let mut edge = [0u8; EDGE_LEN];
            file.read_exact(&mut edge)?;
            ctx.update(&edge);
            let edge_len = u64::try_from(EDGE_LEN).unwrap_or(u64::MAX);
            file.seek(SeekFrom::Start(length.saturating_sub(edge_len)))?;
            file.read_exact(&mut edge)?;
            ctx.update(&edge);
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(ctx.finish().as_ref());
        Ok(Self { length, digest })
    }

    /// Whether the file at `path` still has this signature.
    ///
    /// # Errors
    ///
    /// Same as [`FileSignature::of`].
    pub fn matches(&self, path: impl AsRef<Path>) -> Result<bool, DbError> {
        Ok(Self::of(path)? == *self)
    }
}
