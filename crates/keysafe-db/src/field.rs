//! Fields and logical records.
//!
//! This module provides:
//! - [`FieldType`]: the 16-bit tag of a field, with the entry tag constants
//! - [`Field`]: one tag plus raw value, wiped on drop
//! - [`Record`]: the known fields of one entry plus a side list of fields
//!   the reading version did not recognise, each pinned to its position
//! - [`FieldSet`]: which tags a format version understands
//!
//! Records never interpret values. Unknown fields are carried as opaque
//! bytes and put back at their original positions on write.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Field tags
// ---------------------------------------------------------------------------

/// Type tag of a field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldType(pub u16);

impl FieldType {
    /// Combined group, title and user name (V1 only).
    pub const NAME: Self = Self(0x00);
    /// 16-byte entry UUID.
    pub const UUID: Self = Self(0x01);
    /// Dotted group path.
    pub const GROUP: Self = Self(0x02);
    /// Entry title.
    pub const TITLE: Self = Self(0x03);
    /// User name.
    pub const USER: Self = Self(0x04);
    /// Free-text notes.
    pub const NOTES: Self = Self(0x05);
    /// The password itself.
    pub const PASSWORD: Self = Self(0x06);
    /// Creation time.
    pub const CTIME: Self = Self(0x07);
    /// Password modification time.
    pub const PMTIME: Self = Self(0x08);
    /// Last access time.
    pub const ATIME: Self = Self(0x09);
    /// Password expiry time.
    pub const XTIME: Self = Self(0x0a);
    /// Reserved slot; never produced, treated as unknown.
    pub const RESERVED: Self = Self(0x0b);
    /// Record modification time.
    pub const RMTIME: Self = Self(0x0c);
    /// URL.
    pub const URL: Self = Self(0x0d);
    /// Autotype sequence.
    pub const AUTOTYPE: Self = Self(0x0e);
    /// Encoded password history (see [`crate::history`]).
    pub const PWHIST: Self = Self(0x0f);
    /// Password generation policy.
    pub const POLICY: Self = Self(0x10);
    /// Expiry interval in days.
    pub const XTIME_INTERVAL: Self = Self(0x11);
    /// Run command.
    pub const RUNCMD: Self = Self(0x12);
    /// Double-click action.
    pub const DCA: Self = Self(0x13);
    /// E-mail address.
    pub const EMAIL: Self = Self(0x14);
    /// Protected-entry flag.
    pub const PROTECTED: Self = Self(0x15);
    /// Per-entry symbol set.
    pub const SYMBOLS: Self = Self(0x16);
    /// Shift+double-click action.
    pub const SHIFT_DCA: Self = Self(0x17);
    /// Named password policy.
    pub const POLICY_NAME: Self = Self(0x18);
    /// Keyboard shortcut.
    pub const KB_SHORTCUT: Self = Self(0x19);
    /// End-of-record marker, always zero length.
    pub const END: Self = Self(0xff);

    /// `true` for the end-of-record marker.
    #[must_use]
    pub const fn is_end(self) -> bool {
        self.0 == Self::END.0
    }

    /// Human-readable name of an entry tag, if it has one.
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        Some(match self.0 {
            0x00 => "name",
            0x01 => "uuid",
            0x02 => "group",
            0x03 => "title",
            0x04 => "user",
            0x05 => "notes",
            0x06 => "password",
            0x07 => "ctime",
            0x08 => "pmtime",
            0x09 => "atime",
            0x0a => "xtime",
            0x0c => "rmtime",
            0x0d => "url",
            0x0e => "autotype",
            0x0f => "pwhist",
            0x10 => "policy",
            0x11 => "xtime-interval",
            0x12 => "runcmd",
            0x13 => "dca",
            0x14 => "email",
            0x15 => "protected",
            0x16 => "symbols",
            0x17 => "shift-dca",
            0x18 => "policy-name",
            0x19 => "kb-shortcut",
            0xff => "end",
            _ => return None,
        })
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(l) => write!(f, "{l}"),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}

/// Tags a format version understands. Anything else is kept as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSet {
    /// V1 positional triples: name, password, notes.
    V1,
    /// V2: uuid, group, title, user, notes, password.
    V2,
    /// V3: every defined entry tag except the reserved slot.
    V3,
}

impl FieldSet {
    /// Whether `tag` is understood by this version.
    #[must_use]
    pub const fn contains(self, tag: FieldType) -> bool {
        match self {
            Self::V1 => matches!(tag.0, 0x00 | 0x05 | 0x06),
            Self::V2 => matches!(tag.0, 0x01..=0x06),
            Self::V3 => matches!(tag.0, 0x01..=0x0a | 0x0c..=0x19),
        }
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// One tag/value unit. The value is wiped when the field is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Field {
    /// Type tag.
    #[zeroize(skip)]
    pub tag: FieldType,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

impl Field {
    /// Build a field from a tag and raw bytes.
    #[must_use]
    pub fn new(tag: FieldType, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// The zero-length end-of-record marker.
    #[must_use]
    pub const fn end() -> Self {
        Self {
            tag: FieldType::END,
            value: Vec::new(),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("tag", &self.tag)
            .field("len", &self.value.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A field the reading version did not recognise, with its position in the
/// record as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    /// Index within the full on-disk field sequence of the record.
    pub position: usize,
    /// The field, byte-for-byte.
    pub field: Field,
}

/// One logical record (an entry), without its end marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
    unknown: Vec<UnknownField>,
}

impl Record {
    /// An empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: Vec::new(),
            unknown: Vec::new(),
        }
    }

    /// Split an on-disk field sequence into known fields and positioned
    /// unknown fields.
    #[must_use]
    pub fn from_wire(wire: Vec<Field>, known: FieldSet) -> Self {
        let mut record = Self::new();
        for (position, field) in wire.into_iter().enumerate() {
            if known.contains(field.tag) {
                record.fields.push(field);
            } else {
                record.unknown.push(UnknownField { position, field });
            }
        }
        record
    }

    /// The on-disk field sequence: known fields with each unknown field put
    /// back at its recorded position. Unknown fields positioned past the end
    /// are appended in stored order.
    #[must_use]
    pub fn wire_fields(&self) -> Vec<&Field> {
        let total = self.fields.len().saturating_add(self.unknown.len());
        let mut out = Vec::with_capacity(total);
        let mut known = self.fields.iter();
        let mut unknown = self.unknown.iter().peekable();
        loop {
            if let Some(u) = unknown.next_if(|u| u.position <= out.len()) {
                out.push(&u.field);
                continue;
            }
            match known.next() {
                Some(f) => out.push(f),
                None => break,
            }
        }
        out.extend(unknown.map(|u| &u.field));
        out
    }

    /// First known field with `tag`.
    #[must_use]
    pub fn get(&self, tag: FieldType) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Value of `tag` as UTF-8 text, if present and valid.
    #[must_use]
    pub fn text(&self, tag: FieldType) -> Option<&str> {
        self.get(tag).and_then(|f| std::str::from_utf8(&f.value).ok())
    }

    /// Replace the value of `tag`, or append it if absent.
    pub fn set(&mut self, tag: FieldType, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if let Some(existing) = self.fields.iter_mut().find(|f| f.tag == tag) {
            existing.value.zeroize();
            existing.value = value;
        } else {
            self.fields.push(Field::new(tag, value));
        }
    }

    /// [`Record::set`] for text values.
    pub fn set_text(&mut self, tag: FieldType, value: &str) {
        self.set(tag, value.as_bytes().to_vec());
    }

    /// Remove every known field with `tag`. Returns whether any was removed.
    pub fn remove(&mut self, tag: FieldType) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.tag != tag);
        self.fields.len() != before
    }

    /// Attach an opaque field after everything currently in the record.
    pub fn push_unknown(&mut self, field: Field) {
        let position = self.fields.len().saturating_add(self.unknown.len());
        self.unknown.push(UnknownField { position, field });
    }

    /// Known fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Unknown fields with their positions.
    #[must_use]
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// `true` when the record holds no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }
}
