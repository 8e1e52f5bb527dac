//! `keysafe-db`: encrypted password database containers.
//!
//! Reads and writes the V1, V2 and V3 container formats, keeps unknown
//! record fields intact across a load/save cycle, and provides the
//! password-history codec, sidecar locks and the single-file encryptor.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod config;
pub mod context;
pub mod error;

pub mod codec;
pub mod field;
pub mod header;
pub mod history;

pub mod container;
pub mod format;

pub mod file_crypt;
pub mod lock;
pub mod signature;

pub use config::ContainerConfig;
pub use container::{check_password, CheckStatus, Container, Mode, ReadOutcome};
pub use context::{Clock, FileContext, FixedClock, SaveIdentity, SystemClock};
pub use error::DbError;
pub use field::{Field, FieldSet, FieldType, Record, UnknownField};
pub use file_crypt::{decrypt_file, encrypt_file, seal, unseal};
pub use keysafe_crypto_core::SecretBuffer;
pub use format::{FormatProfile, FormatVersion, HeaderStyle};
pub use header::HeaderRecord;
pub use history::{HistoryEntry, HistoryError, PasswordHistory};
pub use lock::{is_locked, lock, lock_as, unlock, LockInfo, LockOutcome};
pub use signature::FileSignature;
