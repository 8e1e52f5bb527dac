//! Advisory sidecar locks.
//!
//! A database `foo.psafe3` is locked by the exclusive creation of
//! `foo.plk` next to it, holding `user@host:pid` of the holder. Config
//! files keep their extension (`foo.cfg` locks as `foo.cfg.plk`). There is
//! no heartbeat and no stale-lock reclamation; a crashed holder leaves the
//! sidecar behind until [`unlock`] is called.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::context::SaveIdentity;
use crate::error::DbError;

/// Extension of the sidecar file.
pub const LOCK_EXTENSION: &str = "plk";

/// A lock this process now holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    /// The sidecar file.
    pub sidecar: PathBuf,
    /// Text written into the sidecar.
    pub holder: String,
}

/// Result of [`lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The sidecar was created by this call.
    Acquired(LockInfo),
    /// The sidecar already existed; holds its contents.
    AlreadyLocked(String),
}

impl LockOutcome {
    /// Convert [`LockOutcome::AlreadyLocked`] into [`DbError::AlreadyLocked`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::AlreadyLocked`] with the holder text.
    pub fn into_result(self) -> Result<LockInfo, DbError> {
        match self {
            Self::Acquired(info) => Ok(info),
            Self::AlreadyLocked(holder) => Err(DbError::AlreadyLocked { holder }),
        }
    }
}

/// Sidecar path for `path`.
#[must_use]
pub fn sidecar_path(path: &Path) -> PathBuf {
    let is_cfg = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cfg"));
    if is_cfg {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(LOCK_EXTENSION);
        PathBuf::from(name)
    } else {
        path.with_extension(LOCK_EXTENSION)
    }
}

/// Lock `path` for the current user, host and process.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the sidecar cannot be created or written for
/// any reason other than already existing.
pub fn lock(path: impl AsRef<Path>) -> Result<LockOutcome, DbError> {
    lock_as(path, &SaveIdentity::current())
}

/// Lock `path` on behalf of `identity`.
///
/// Never overwrites an existing sidecar.
///
/// # Errors
///
/// Same as [`lock`].
pub fn lock_as(path: impl AsRef<Path>, identity: &SaveIdentity) -> Result<LockOutcome, DbError> {
    let sidecar = sidecar_path(path.as_ref());
    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&sidecar)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let holder = fs::read_to_string(&sidecar).unwrap_or_default();
            tracing::debug!(sidecar = %sidecar.display(), %holder, "already locked");
            return Ok(LockOutcome::AlreadyLocked(holder));
        }
        Err(e) => return Err(e.into()),
    };

    let holder = identity.lock_text();
    if let Err(e) = file.write_all(holder.as_bytes()).and_then(|()| file.sync_all()) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(&sidecar) {
            tracing::warn!(sidecar = %sidecar.display(), error = %cleanup, "could not remove half-written lock");
        }
        return Err(e.into());
    }
    tracing::debug!(sidecar = %sidecar.display(), "lock acquired");
    Ok(LockOutcome::Acquired(LockInfo { sidecar, holder }))
}

/// Remove the sidecar of `path`. A missing sidecar is not an error.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the sidecar exists but cannot be removed.
pub fn unlock(path: impl AsRef<Path>) -> Result<(), DbError> {
    let sidecar = sidecar_path(path.as_ref());
    match fs::remove_file(&sidecar) {
        Ok(()) => {
            tracing::debug!(sidecar = %sidecar.display(), "lock released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether the sidecar of `path` exists.
#[must_use]
pub fn is_locked(path: impl AsRef<Path>) -> bool {
    sidecar_path(path.as_ref()).exists()
}
