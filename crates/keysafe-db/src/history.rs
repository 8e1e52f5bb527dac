//! Password history: a bounded FIFO of previous passwords and the compact
//! text encoding stored in an entry's history field.
//!
//! Encoding, with no separators:
//!
//! ```text
//! <saving: 1 digit><max: 2 hex><count: 2 hex>
//! count x <changed_at: 8 hex><len: 3 decimal><password: len chars>
//! ```
//!
//! Lengths count Unicode scalar values, not bytes. [`PasswordHistory::parse`]
//! is lenient: damaged entries are skipped and counted instead of failing
//! the whole field.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Longest password the 3-digit length prefix can describe.
pub const MAX_PASSWORD_CHARS: usize = 999;

const HEADER_LEN: usize = 5;
const TIMESTAMP_LEN: usize = 8;
const LENGTH_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Errors from encoding a history.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// A stored password is longer than the length prefix allows.
    #[error("history password of {chars} characters exceeds {MAX_PASSWORD_CHARS}")]
    PasswordTooLong {
        /// Length of the offending password in characters.
        chars: usize,
    },
}

/// One previous password and when it was replaced.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct HistoryEntry {
    /// Seconds since the Unix epoch.
    pub changed_at: u32,
    /// The old password.
    pub password: String,
}

impl fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("changed_at", &self.changed_at)
            .field("password", &"***")
            .finish()
    }
}

/// Bounded ring of previous passwords.
///
/// Entries are kept oldest first. A parsed history may hold more than `max`
/// entries; the next [`push`](PasswordHistory::push) or
/// [`set_max`](PasswordHistory::set_max) brings it back within capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordHistory {
    saving: bool,
    max: u8,
    entries: VecDeque<HistoryEntry>,
}

impl PasswordHistory {
    /// An empty history.
    #[must_use]
    pub const fn new(saving: bool, max: u8) -> Self {
        Self {
            saving,
            max,
            entries: VecDeque::new(),
        }
    }

    /// Whether [`push`](Self::push) records anything.
    #[must_use]
    pub const fn saving(&self) -> bool {
        self.saving
    }

    /// Capacity of the ring.
    #[must_use]
    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `password` as replaced at `changed_at`.
    ///
    /// Does nothing while saving is off. At capacity the oldest entry is
    /// evicted first.
    pub fn push(&mut self, password: &str, changed_at: u32) {
        if !self.saving || self.max == 0 {
            return;
        }
        while self.entries.len() >= usize::from(self.max) {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            changed_at,
            password: password.to_owned(),
        });
    }

    /// Change the capacity, evicting the oldest entries when shrinking.
    pub fn set_max(&mut self, max: u8) {
        self.max = max;
        self.trim();
    }

    /// Turn recording on or off. Stored entries are kept either way.
    pub fn set_saving(&mut self, saving: bool) {
        self.saving = saving;
    }

    fn trim(&mut self) {
        while self.entries.len() > usize::from(self.max) {
            self.entries.pop_front();
        }
    }

    // -----------------------------------------------------------------------
    // Codec
    // -----------------------------------------------------------------------

    /// Encode to the history field text.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::PasswordTooLong`] if an entry exceeds
    /// [`MAX_PASSWORD_CHARS`].
    pub fn serialize(&self) -> Result<String, HistoryError> {
        let mut out = String::with_capacity(HEADER_LEN);
        let count = u8::try_from(self.entries.len()).unwrap_or(u8::MAX);
        let _ = write!(out, "{}{:02x}{:02x}", u8::from(self.saving), self.max, count);
        for entry in &self.entries {
            let chars = entry.password.chars().count();
            if chars > MAX_PASSWORD_CHARS {
                out.zeroize();
                return Err(HistoryError::PasswordTooLong { chars });
            }
            let _ = write!(out, "{:08x}{chars:03}", entry.changed_at);
            out.push_str(&entry.password);
        }
        Ok(out)
    }

    /// Decode history field text.
    ///
    /// Returns the history and the number of problems met:
    /// - an unreadable header counts one and yields an empty history
    /// - a bad timestamp counts one and skips that entry
    /// - a bad length or a truncated entry counts one and stops parsing
    /// - text left over after `count` entries counts one
    ///
    /// More entries than `max` is not an error and every entry is kept.
    #[must_use]
    pub fn parse(raw: &str) -> (Self, usize) {
        if raw.is_empty() {
            return (Self::default(), 0);
        }
        let chars: Vec<char> = raw.chars().collect();
        let mut cursor = Cursor {
            chars: &chars,
            pos: 0,
        };

        let header = cursor
            .take(1)
            .and_then(|s| s.to_digit(10))
            .zip(cursor.take(2).and_then(|s| s.hex_u8()))
            .zip(cursor.take(2).and_then(|s| s.hex_u8()));
        let Some(((saving, max), count)) = header else {
            return (Self::default(), 1);
        };

        let mut history = Self::new(saving != 0, max);
        let mut errors = 0usize;
        let mut stopped = false;

        for _ in 0..count {
            let Some(ts) = cursor.take(TIMESTAMP_LEN) else {
                stopped = true;
                break;
            };
            let Some(len) = cursor.take(LENGTH_LEN).and_then(|s| s.decimal_len()) else {
                stopped = true;
                break;
            };
            let Some(password) = cursor.take(len) else {
                stopped = true;
                break;
            };
            match ts.hex_u32() {
                Some(changed_at) => history.entries.push_back(HistoryEntry {
                    changed_at,
                    password: password.collect(),
                }),
                None => errors = errors.saturating_add(1),
            }
        }

        if stopped || !cursor.at_end() {
            errors = errors.saturating_add(1);
        }
        (history, errors)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<Span<'a>> {
        let end = self.pos.checked_add(n)?;
        let span = self.chars.get(self.pos..end)?;
        self.pos = end;
        Some(Span(span))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
}

struct Span<'a>(&'a [char]);

impl Span<'_> {
    fn to_digit(&self, radix: u32) -> Option<u32> {
        match self.0 {
            [c] => c.to_digit(radix),
            _ => None,
        }
    }

    fn hex_u32(&self) -> Option<u32> {
        self.0.iter().try_fold(0u32, |acc, c| {
            let d = c.to_digit(16)?;
            acc.checked_mul(16)?.checked_add(d)
        })
    }

    fn hex_u8(&self) -> Option<u8> {
        self.hex_u32().and_then(|v| u8::try_from(v).ok())
    }

    fn decimal_len(&self) -> Option<usize> {
        self.0.iter().try_fold(0usize, |acc, c| {
            let d = usize::try_from(c.to_digit(10)?).ok()?;
            acc.checked_mul(10)?.checked_add(d)
        })
    }

    fn collect(&self) -> String {
        self.0.iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
