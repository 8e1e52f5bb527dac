//! Open containers and the password check.
//!
//! A [`Container`] is either reading or writing one file for its whole
//! lifetime. Construction runs the complete opening phase (format probe,
//! passphrase check, header) so every value handed out is fully open.
//!
//! This module provides:
//! - [`Container::open`] / [`Container::create`]: read or write side
//! - [`Container::read_record`] / [`Container::write_record`]: record I/O
//! - [`Container::close`]: trailer, flush and first-error reporting
//! - [`check_password`]: passphrase check without decrypting records

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::ContainerConfig;
use crate::context::FileContext;
use crate::error::DbError;
use crate::field::Record;
use crate::format::legacy::{self, LegacyReader, LegacyWriter};
use crate::format::v3::{self, V3Reader, V3Writer};
use crate::format::FormatVersion;
use crate::header::HeaderRecord;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Direction fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Opened with [`Container::open`].
    Read,
    /// Opened with [`Container::create`].
    Write,
}

/// Result of one [`Container::read_record`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The next record.
    Record(Record),
    /// No more records. Returned again on every later read.
    EndOfFile,
}

/// Result of [`check_password`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// The passphrase opens the file.
    Success {
        /// Version the file was recognised as.
        version: FormatVersion,
    },
    /// The passphrase does not match.
    WrongPassword,
    /// The file is not a container of the requested (or any) version.
    NotThisFormat,
    /// The file could not be opened or read.
    CantOpenFile,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

enum ReadSession {
    V3(V3Reader),
    Legacy(LegacyReader),
}

enum WriteSession {
    V3(V3Writer),
    Legacy(LegacyWriter),
}

impl WriteSession {
    fn finish(self) -> Result<(), DbError> {
        match self {
            Self::V3(w) => w.finish(),
            Self::Legacy(w) => w.finish(),
        }
    }

    fn abandon(self) {
        match self {
            Self::V3(w) => w.abandon(),
            Self::Legacy(w) => w.abandon(),
        }
    }
}

enum State {
    Read(ReadSession),
    Write(WriteSession),
    Closed,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// One open database file.
///
/// Closing happens on [`Container::close`] or on drop; errors seen only at
/// drop time are logged.
pub struct Container {
    path: PathBuf,
    version: FormatVersion,
    mode: Mode,
    header: HeaderRecord,
    state: State,
    ctx: FileContext,
    poison: Option<std::io::Error>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("mode", &self.mode)
            .field("closed", &matches!(self.state, State::Closed))
            .finish_non_exhaustive()
    }
}

fn open_file(path: &Path) -> Result<(File, u64), DbError> {
    let cant_open = |source| DbError::CantOpenFile {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(cant_open)?;
    let len = file.metadata().map_err(cant_open)?.len();
    Ok((file, len))
}

/// Whether to take the V3 path. A tagged file is never read as legacy.
fn wants_v3(file: &mut File, requested: Option<FormatVersion>) -> Result<bool, DbError> {
    let tagged = v3::has_tag(file)?;
    match requested {
        None => Ok(tagged),
        Some(FormatVersion::V3) => Ok(true),
        Some(_) if tagged => Err(DbError::NotThisFormat),
        Some(_) => Ok(false),
    }
}

impl Container {
    /// Open `path` for reading.
    ///
    /// `version == None` probes: the V3 tag first, then the legacy layout,
    /// where the V2 marker decides between V2 and V1.
    ///
    /// # Errors
    ///
    /// - [`DbError::CantOpenFile`] if the file cannot be opened
    /// - [`DbError::NotThisFormat`] if the layout does not match
    /// - [`DbError::WrongPassword`] if the passphrase check fails
    /// - framing and codec errors from the header
    pub fn open(
        path: impl AsRef<Path>,
        passphrase: &[u8],
        version: Option<FormatVersion>,
        ctx: FileContext,
        config: &ContainerConfig,
    ) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let (mut file, len) = open_file(&path)?;

        let (session, header, version) = if wants_v3(&mut file, version)? {
            let (reader, header) = V3Reader::open(file, len, passphrase, config)?;
            (ReadSession::V3(reader), header, FormatVersion::V3)
        } else {
            let (reader, header) = LegacyReader::open(file, len, passphrase, version, config)?;
            let settled = reader.version();
            (ReadSession::Legacy(reader), header, settled)
        };
        tracing::debug!(path = %path.display(), %version, "container opened for reading");

        Ok(Self {
            path,
            version,
            mode: Mode::Read,
            header,
            state: State::Read(session),
            ctx,
            poison: None,
        })
    }

    /// Create (or truncate) `path` and write the header.
    ///
    /// The header is stamped with the save time, saver identity,
    /// `config.application` and the version numbers of `version`. V3 files
    /// use [`ContainerConfig::effective_iterations`].
    ///
    /// # Errors
    ///
    /// - [`DbError::CantOpenFile`] if the file cannot be created
    /// - key derivation, cipher or I/O errors while writing the header
    pub fn create(
        path: impl AsRef<Path>,
        passphrase: &[u8],
        version: FormatVersion,
        mut header: HeaderRecord,
        mut ctx: FileContext,
        config: &ContainerConfig,
    ) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let profile = version.profile();
        header.stamp_for_save(&mut ctx, &config.application, profile.major, profile.minor);
        header.iterations = if version == FormatVersion::V3 {
            config.effective_iterations()
        } else {
            0
        };

        let file = File::create(&path).map_err(|source| DbError::CantOpenFile {
            path: path.clone(),
            source,
        })?;
        let rng = ctx.rng.as_mut();
        let session = match version {
            FormatVersion::V3 => WriteSession::V3(V3Writer::start(file, passphrase, &header, rng)?),
            older => WriteSession::Legacy(LegacyWriter::start(
                file, passphrase, older, &header, rng,
            )?),
        };
        tracing::debug!(path = %path.display(), %version, "container created");

        Ok(Self {
            path,
            version,
            mode: Mode::Write,
            header,
            state: State::Write(session),
            ctx,
            poison: None,
        })
    }

    /// Header read at open, or written at create.
    #[must_use]
    pub const fn header(&self) -> &HeaderRecord {
        &self.header
    }

    /// Format version in force.
    #[must_use]
    pub const fn version(&self) -> FormatVersion {
        self.version
    }

    /// Path given at construction.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read or write.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Decrypt the next record.
    ///
    /// # Errors
    ///
    /// - [`DbError::Closed`] after [`Container::close`]
    /// - [`DbError::WrongMode`] on a write container
    /// - codec errors, or [`DbError::IntegrityMismatch`] at the end of a V3
    ///   file whose records do not match the stored HMAC
    pub fn read_record(&mut self) -> Result<ReadOutcome, DbError> {
        let session = match &mut self.state {
            State::Closed => return Err(DbError::Closed),
            State::Write(_) => return Err(DbError::WrongMode),
            State::Read(session) => session,
        };
        let next = match session {
            ReadSession::V3(r) => r.read_record()?,
            ReadSession::Legacy(r) => r.read_record()?,
        };
        Ok(next.map_or(ReadOutcome::EndOfFile, ReadOutcome::Record))
    }

    /// Encrypt and append `record`.
    ///
    /// An I/O failure poisons the container: later writes return
    /// [`DbError::Poisoned`] and [`Container::close`] reports the first
    /// failure.
    ///
    /// # Errors
    ///
    /// - [`DbError::Closed`] after [`Container::close`]
    /// - [`DbError::WrongMode`] on a read container
    /// - [`DbError::Poisoned`] after an earlier write failure
    /// - codec or I/O errors
    pub fn write_record(&mut self, record: &Record) -> Result<(), DbError> {
        let session = match &mut self.state {
            State::Closed => return Err(DbError::Closed),
            State::Read(_) => return Err(DbError::WrongMode),
            State::Write(session) => session,
        };
        if self.poison.is_some() {
            return Err(DbError::Poisoned);
        }

        let rng = self.ctx.rng.as_mut();
        let result = match session {
            WriteSession::V3(w) => w.write_record(record, rng),
            WriteSession::Legacy(w) => w.write_record(record, rng),
        };
        if let Err(DbError::Io(e)) = &result {
            tracing::warn!(path = %self.path.display(), error = %e, "write failed, container poisoned");
            self.poison = Some(std::io::Error::new(e.kind(), e.to_string()));
        }
        result
    }

    /// Finish the file and release the handle. Idempotent.
    ///
    /// Write containers get their trailer, a flush and a sync. A poisoned
    /// container is still flushed and closed, and the first write failure
    /// is returned.
    ///
    /// # Errors
    ///
    /// The first write failure, or any error while finishing.
    pub fn close(&mut self) -> Result<(), DbError> {
        let result = match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => return Ok(()),
            State::Read(_) => Ok(()),
            State::Write(session) => match self.poison.take() {
                Some(first) => {
                    session.abandon();
                    Err(DbError::Io(first))
                }
                None => session.finish(),
            },
        };
        tracing::debug!(path = %self.path.display(), ok = result.is_ok(), "container closed");
        result
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "error closing container on drop");
        }
    }
}

// ---------------------------------------------------------------------------
// Password check
// ---------------------------------------------------------------------------

/// Check `passphrase` against the file at `path` without decrypting any
/// entry record. The file is opened read-only.
///
/// With `version == None` the format is probed as in [`Container::open`].
#[must_use]
pub fn check_password(
    path: impl AsRef<Path>,
    passphrase: &[u8],
    version: Option<FormatVersion>,
) -> CheckStatus {
    match probe(path.as_ref(), passphrase, version) {
        Ok(version) => CheckStatus::Success { version },
        Err(DbError::WrongPassword) => CheckStatus::WrongPassword,
        Err(DbError::CantOpenFile { .. } | DbError::Io(_)) => CheckStatus::CantOpenFile,
        Err(e) => {
            tracing::debug!(error = %e, "password check treated as format mismatch");
            CheckStatus::NotThisFormat
        }
    }
}

fn probe(
    path: &Path,
    passphrase: &[u8],
    version: Option<FormatVersion>,
) -> Result<FormatVersion, DbError> {
    let (mut file, len) = open_file(path)?;
    if wants_v3(&mut file, version)? {
        v3::authenticate(&mut file, len, passphrase)?;
        return Ok(FormatVersion::V3);
    }

    let mut source = BufReader::new(file);
    let (_, mut chain) = legacy::authenticate(&mut source, len, passphrase)?;
    let first = legacy::read_triple(&mut source, &mut chain, len)?;
    legacy::settle_version(version, first.as_ref().is_some_and(legacy::is_v2_marker))
}
