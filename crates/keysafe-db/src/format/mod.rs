//! On-disk format generations and the per-version dispatch table.
//!
//! - [`v3`]: Twofish-CBC, iterated SHA-256 key, structured header, HMAC
//! - [`legacy`]: Blowfish-CBC with the SHA-1 passkey check (V1 and V2)

use std::fmt;

use keysafe_crypto_core::CipherKind;
use serde::{Deserialize, Serialize};

use crate::field::FieldSet;

pub mod legacy;
pub mod v3;

/// A database format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatVersion {
    /// Positional name/password/notes triples, no header.
    V1,
    /// Tagged records after a V1-style marker record.
    V2,
    /// Current format.
    V3,
}

/// How a version stores its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// No header at all.
    None,
    /// A V1-style marker record whose notes carry the preferences.
    MarkerRecord,
    /// A full header record.
    Record,
}

/// Everything that differs between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatProfile {
    /// Block cipher of the data region.
    pub cipher: CipherKind,
    /// Header layout.
    pub header: HeaderStyle,
    /// Entry tags the version understands.
    pub fields: FieldSet,
    /// Major version reported in the header.
    pub major: u8,
    /// Minor version reported in the header.
    pub minor: u8,
}

impl FormatVersion {
    /// Dispatch table entry for this version.
    #[must_use]
    pub const fn profile(self) -> FormatProfile {
        match self {
            Self::V1 => FormatProfile {
                cipher: CipherKind::Blowfish,
                header: HeaderStyle::None,
                fields: FieldSet::V1,
                major: 1,
                minor: 0,
            },
            Self::V2 => FormatProfile {
                cipher: CipherKind::Blowfish,
                header: HeaderStyle::MarkerRecord,
                fields: FieldSet::V2,
                major: 2,
                minor: 0,
            },
            Self::V3 => FormatProfile {
                cipher: CipherKind::Twofish,
                header: HeaderStyle::Record,
                fields: FieldSet::V3,
                major: crate::header::V3_MAJOR,
                minor: crate::header::V3_MINOR,
            },
        }
    }

    /// `true` for the Blowfish generations.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::V1 | Self::V2)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V1 => "V1",
            Self::V2 => "V2",
            Self::V3 => "V3",
        };
        f.write_str(s)
    }
}
