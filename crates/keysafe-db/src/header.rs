//! The header record: file-wide metadata written ahead of the entries.
//!
//! In V3 files the header is a record of its own, encoded with the same
//! field codec as entries and terminated by the end marker. Legacy files
//! carry only the preference string (V2) or nothing at all (V1).

use std::fmt::Write as _;

use crate::context::{generate_uuid, FileContext};
use crate::error::DbError;
use crate::field::{Field, FieldType};

// ---------------------------------------------------------------------------
// Header tags
// ---------------------------------------------------------------------------

/// Tags used inside the V3 header record.
pub mod tag {
    use crate::field::FieldType;

    /// Format version, two bytes: minor then major.
    pub const VERSION: FieldType = FieldType(0x00);
    /// 16-byte file UUID.
    pub const UUID: FieldType = FieldType(0x01);
    /// Non-default preference string.
    pub const PREFERENCES: FieldType = FieldType(0x02);
    /// Time of last save.
    pub const LAST_SAVED_AT: FieldType = FieldType(0x04);
    /// Deprecated combined user and host of last save. Read only.
    pub const LAST_SAVED_USER_HOST: FieldType = FieldType(0x05);
    /// Application that last saved the file.
    pub const LAST_SAVED_WITH: FieldType = FieldType(0x06);
    /// User who last saved the file.
    pub const LAST_SAVED_BY: FieldType = FieldType(0x07);
    /// Host the file was last saved on.
    pub const LAST_SAVED_ON: FieldType = FieldType(0x08);
    /// Database display name.
    pub const DB_NAME: FieldType = FieldType(0x09);
    /// Database description.
    pub const DB_DESCRIPTION: FieldType = FieldType(0x0a);
    /// Recently used entry UUIDs.
    pub const RECENTLY_USED: FieldType = FieldType(0x0f);
    /// One empty group path; may repeat.
    pub const EMPTY_GROUP: FieldType = FieldType(0x11);
}

/// Major version written to V3 headers.
pub const V3_MAJOR: u8 = 0x03;

/// Minor version written to V3 headers.
pub const V3_MINOR: u8 = 0x0c;

const NIL_UUID: [u8; 16] = [0; 16];

/// Header tags whose values are text.
const TEXT_TAGS: [FieldType; 9] = [
    tag::PREFERENCES,
    tag::LAST_SAVED_USER_HOST,
    tag::LAST_SAVED_WITH,
    tag::LAST_SAVED_BY,
    tag::LAST_SAVED_ON,
    tag::DB_NAME,
    tag::DB_DESCRIPTION,
    tag::RECENTLY_USED,
    tag::EMPTY_GROUP,
];

/// Save-stamp tags, replaced on every save.
const STAMP_TAGS: [FieldType; 3] = [tag::LAST_SAVED_WITH, tag::LAST_SAVED_BY, tag::LAST_SAVED_ON];

// ---------------------------------------------------------------------------
// HeaderRecord
// ---------------------------------------------------------------------------

/// File-wide metadata.
///
/// `iterations` is meaningful for V3 only and is carried in the pre-amble,
/// not in the header fields. Legacy files report zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Major format version.
    pub major: u8,
    /// Minor format version.
    pub minor: u8,
    /// Key stretch rounds.
    pub iterations: u32,
    /// File identifier, generated on first save when nil.
    pub file_uuid: [u8; 16],
    /// Preference string.
    pub preferences: String,
    /// Epoch seconds of the last save.
    pub last_saved_at: Option<u32>,
    /// User of the last save.
    pub last_saved_by: String,
    /// Host of the last save.
    pub last_saved_on: String,
    /// Application of the last save.
    pub last_saved_with: String,
    /// Display name.
    pub db_name: String,
    /// Description.
    pub db_description: String,
    /// Recently used entry UUIDs, most recent first.
    pub recently_used: Vec<[u8; 16]>,
    /// Group paths that hold no entries.
    pub empty_groups: Vec<String>,
    /// Header fields this build does not understand, in stored order.
    ///
    /// Text fields whose bytes are not UTF-8 are kept here verbatim.
    pub unknown_fields: Vec<Field>,
}

impl HeaderRecord {
    /// Update the save stamp before writing.
    ///
    /// Sets version, time, user, host and application. Generates the file
    /// UUID only if it is still nil.
    pub(crate) fn stamp_for_save(
        &mut self,
        ctx: &mut FileContext,
        application: &str,
        major: u8,
        minor: u8,
    ) {
        self.major = major;
        self.minor = minor;
        self.last_saved_at = Some(ctx.now_u32());
        self.last_saved_by.clone_from(&ctx.identity.user);
        self.last_saved_on.clone_from(&ctx.identity.host);
        application.clone_into(&mut self.last_saved_with);
        if self.file_uuid == NIL_UUID {
            self.file_uuid = generate_uuid(ctx.rng.as_mut());
        }
        self.unknown_fields.retain(|f| !STAMP_TAGS.contains(&f.tag));
    }

    /// `true` if a raw copy of `t` is carried in `unknown_fields`.
    fn carries_raw(&self, t: FieldType) -> bool {
        self.unknown_fields.iter().any(|f| f.tag == t)
    }

    /// Fields of the V3 header record, without the end marker.
    #[must_use]
    pub fn to_fields(&self) -> Vec<Field> {
        let mut out = vec![
            Field::new(tag::VERSION, vec![self.minor, self.major]),
            Field::new(tag::UUID, self.file_uuid.to_vec()),
        ];
        if !self.carries_raw(tag::PREFERENCES) {
            out.push(Field::new(tag::PREFERENCES, self.preferences.as_bytes()));
        }
        if let Some(t) = self.last_saved_at {
            out.push(Field::new(tag::LAST_SAVED_AT, t.to_le_bytes().to_vec()));
        }
        let texts = [
            (tag::LAST_SAVED_BY, &self.last_saved_by),
            (tag::LAST_SAVED_ON, &self.last_saved_on),
            (tag::LAST_SAVED_WITH, &self.last_saved_with),
            (tag::DB_NAME, &self.db_name),
            (tag::DB_DESCRIPTION, &self.db_description),
        ];
        for (t, value) in texts {
            if !value.is_empty() && !self.carries_raw(t) {
                out.push(Field::new(t, value.as_bytes()));
            }
        }
        if !self.recently_used.is_empty() {
            out.push(Field::new(
                tag::RECENTLY_USED,
                encode_recently_used(&self.recently_used),
            ));
        }
        for group in &self.empty_groups {
            out.push(Field::new(tag::EMPTY_GROUP, group.as_bytes()));
        }
        out.extend(self.unknown_fields.iter().cloned());
        out
    }

    /// Rebuild from a decoded V3 header record.
    ///
    /// # Errors
    ///
    /// - [`DbError::UnsupportedVersion`] if the major version is not 3
    /// - [`DbError::CorruptRecord`] if a known field has the wrong shape
    pub fn from_fields(fields: Vec<Field>) -> Result<Self, DbError> {
        let mut header = Self {
            major: V3_MAJOR,
            ..Self::default()
        };
        let mut user_host = None;
        let mut saw_by = false;
        let mut saw_on = false;

        for field in fields {
            if TEXT_TAGS.contains(&field.tag) && std::str::from_utf8(&field.value).is_err() {
                header.unknown_fields.push(field);
                continue;
            }
            match field.tag {
                tag::VERSION => {
                    let [minor, major] = fixed::<2>(&field, "version")?;
                    header.major = major;
                    header.minor = minor;
                }
                tag::UUID => header.file_uuid = fixed::<16>(&field, "file uuid")?,
                tag::PREFERENCES => header.preferences = text(&field),
                tag::LAST_SAVED_AT => header.last_saved_at = Some(decode_time(&field)?),
                tag::LAST_SAVED_USER_HOST => user_host = Some(text(&field)),
                tag::LAST_SAVED_WITH => header.last_saved_with = text(&field),
                tag::LAST_SAVED_BY => {
                    header.last_saved_by = text(&field);
                    saw_by = true;
                }
                tag::LAST_SAVED_ON => {
                    header.last_saved_on = text(&field);
                    saw_on = true;
                }
                tag::DB_NAME => header.db_name = text(&field),
                tag::DB_DESCRIPTION => header.db_description = text(&field),
                tag::RECENTLY_USED => {
                    header.recently_used = decode_recently_used(&text(&field))?;
                }
                tag::EMPTY_GROUP => header.empty_groups.push(text(&field)),
                _ => header.unknown_fields.push(field),
            }
        }

        if header.major != V3_MAJOR {
            return Err(DbError::UnsupportedVersion {
                major: header.major,
                minor: header.minor,
            });
        }
        if !saw_by && !saw_on {
            if let Some((user, host)) = user_host.as_deref().and_then(split_user_host) {
                header.last_saved_by = user;
                header.last_saved_on = host;
            }
        }
        Ok(header)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Value of a text field already checked to be UTF-8.
fn text(field: &Field) -> String {
    std::str::from_utf8(&field.value)
        .map(str::to_owned)
        .unwrap_or_default()
}

fn fixed<const N: usize>(field: &Field, what: &str) -> Result<[u8; N], DbError> {
    field.value.as_slice().try_into().map_err(|_| {
        DbError::CorruptRecord(format!(
            "header {what} is {} bytes, expected {N}",
            field.value.len()
        ))
    })
}

/// Four bytes little-endian, or eight hex digits from older writers.
fn decode_time(field: &Field) -> Result<u32, DbError> {
    match field.value.len() {
        4 => Ok(u32::from_le_bytes(fixed::<4>(field, "save time")?)),
        8 => std::str::from_utf8(&field.value)
            .ok()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or_else(|| DbError::CorruptRecord("header save time is not hex".into())),
        n => Err(DbError::CorruptRecord(format!(
            "header save time is {n} bytes"
        ))),
    }
}

/// `"nn"` hex count followed by 32 hex digits per UUID.
fn encode_recently_used(uuids: &[[u8; 16]]) -> Vec<u8> {
    let count = u8::try_from(uuids.len()).unwrap_or(u8::MAX);
    let mut out = format!("{count:02x}");
    for uuid in uuids.iter().take(usize::from(count)) {
        for b in uuid {
            let _ = write!(out, "{b:02x}");
        }
    }
    out.into_bytes()
}

fn decode_recently_used(raw: &str) -> Result<Vec<[u8; 16]>, DbError> {
    let bad = || DbError::CorruptRecord("malformed recently-used list".into());
    let count = raw
        .get(..2)
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(bad)?;
    let body = raw.get(2..).ok_or_else(bad)?;
    if body.len() != count.saturating_mul(32) {
        return Err(bad());
    }
    let mut out = Vec::with_capacity(count);
    for chunk in body.as_bytes().chunks_exact(32) {
        let mut uuid = [0u8; 16];
        for (dst, pair) in uuid.iter_mut().zip(chunk.chunks_exact(2)) {
            let s = std::str::from_utf8(pair).map_err(|_| bad())?;
            *dst = u8::from_str_radix(s, 16).map_err(|_| bad())?;
        }
        out.push(uuid);
    }
    Ok(out)
}

/// Deprecated `"<4 hex user length><user><host>"` field.
fn split_user_host(raw: &str) -> Option<(String, String)> {
    let len = usize::from_str_radix(raw.get(..4)?, 16).ok()?;
    let rest = raw.get(4..)?;
    let split = rest.char_indices().nth(len).map_or(rest.len(), |(i, _)| i);
    if rest.chars().count() < len {
        return None;
    }
    let (user, host) = rest.split_at(split);
    Some((user.to_owned(), host.to_owned()))
}
