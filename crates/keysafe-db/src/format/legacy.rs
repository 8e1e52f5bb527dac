//! V1 and V2 container layout.
//!
//! ```text
//! stuff[8] | passkey hash[20] | salt[20] | IV[8] | records ...
//! ```
//!
//! Blowfish-CBC over the whole record region. V1 stores each entry as a
//! bare name/password/notes triple. V2 opens with a V1-style marker triple
//! and then uses end-marked records.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use keysafe_crypto_core::{
    constant_time_eq, legacy_cipher_key, legacy_passkey_hash, BlockCipher, CbcChain, CipherKind,
    SecureRng, BLOWFISH_BLOCK_LEN, LEGACY_HASH_LEN, LEGACY_STUFF_LEN,
};

use crate::codec::{decode_field, decode_record, encode_field, encode_record};
use crate::config::ContainerConfig;
use crate::error::DbError;
use crate::field::{Field, FieldSet, FieldType, Record};
use crate::format::FormatVersion;
use crate::header::{tag, HeaderRecord};

/// Name of the V2 marker triple.
pub const V2_MARKER_NAME: &str =
    " !!!Version 2 File Format!!! Please upgrade to PasswordSafe 2.0 or later";

/// Password of the V2 marker triple as written.
pub const V2_MARKER_PASSWORD: &str = "2.0";

/// Marker password written by pre-release V2 savers. Accepted on read.
pub const V2_MARKER_PASSWORD_PRE: &str = "pre-2.0";

/// Salt length of the legacy cipher key.
pub const LEGACY_SALT_LEN: usize = 20;

/// Stuff, hash, salt and IV.
pub const PREAMBLE_LEN: usize =
    LEGACY_STUFF_LEN + LEGACY_HASH_LEN + LEGACY_SALT_LEN + BLOWFISH_BLOCK_LEN;

/// Separates title and user inside a V1 name.
pub const V1_NAME_SEPARATOR: char = '\u{AD}';

/// The plaintext fields ahead of the encrypted records.
#[derive(Debug, Clone)]
pub struct LegacyPreamble {
    /// Random bytes fed to the passkey check.
    pub stuff: [u8; LEGACY_STUFF_LEN],
    /// Passkey check value.
    pub hash: [u8; LEGACY_HASH_LEN],
    /// Cipher key salt.
    pub salt: [u8; LEGACY_SALT_LEN],
    /// CBC initialisation vector.
    pub iv: [u8; BLOWFISH_BLOCK_LEN],
}

impl LegacyPreamble {
    /// Fresh random stuff, salt and IV with the passkey hash of
    /// `passphrase`.
    ///
    /// # Errors
    ///
    /// Propagates [`legacy_passkey_hash`] failures.
    pub fn generate(passphrase: &[u8], rng: &mut dyn SecureRng) -> Result<Self, DbError> {
        let mut p = Self {
            stuff: [0; LEGACY_STUFF_LEN],
            hash: [0; LEGACY_HASH_LEN],
            salt: [0; LEGACY_SALT_LEN],
            iv: [0; BLOWFISH_BLOCK_LEN],
        };
        rng.fill_bytes(&mut p.stuff);
        rng.fill_bytes(&mut p.salt);
        rng.fill_bytes(&mut p.iv);
        p.hash = legacy_passkey_hash(passphrase, &p.stuff)?;
        Ok(p)
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREAMBLE_LEN);
        out.extend_from_slice(&self.stuff);
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out
    }

    fn read<R: Read>(source: &mut R) -> Result<Self, DbError> {
        let mut p = Self {
            stuff: [0; LEGACY_STUFF_LEN],
            hash: [0; LEGACY_HASH_LEN],
            salt: [0; LEGACY_SALT_LEN],
            iv: [0; BLOWFISH_BLOCK_LEN],
        };
        source.read_exact(&mut p.stuff)?;
        source.read_exact(&mut p.hash)?;
        source.read_exact(&mut p.salt)?;
        source.read_exact(&mut p.iv)?;
        Ok(p)
    }
}

/// Read the pre-amble and check the passphrase against the passkey hash.
///
/// Returns the pre-amble and a CBC chain ready for the first record.
///
/// # Errors
///
/// - [`DbError::NotThisFormat`] if the file is shorter than the pre-amble
/// - [`DbError::WrongPassword`] if the passkey hash does not match
pub fn authenticate<R: Read>(
    source: &mut R,
    file_len: u64,
    passphrase: &[u8],
) -> Result<(LegacyPreamble, CbcChain), DbError> {
    if file_len < u64::try_from(PREAMBLE_LEN).unwrap_or(u64::MAX) {
        return Err(DbError::NotThisFormat);
    }
    let preamble = LegacyPreamble::read(source)?;
    let check = legacy_passkey_hash(passphrase, &preamble.stuff)?;
    if !constant_time_eq(&check, &preamble.hash) {
        return Err(DbError::WrongPassword);
    }
    let chain = legacy_chain(passphrase, &preamble.salt, &preamble.iv)?;
    Ok((preamble, chain))
}

pub(crate) fn legacy_chain(
    passphrase: &[u8],
    salt: &[u8],
    iv: &[u8],
) -> Result<CbcChain, DbError> {
    let key = legacy_cipher_key(passphrase, salt);
    let cipher = BlockCipher::new(CipherKind::Blowfish, key.expose())?;
    Ok(CbcChain::new(cipher, iv)?)
}

/// Read one positional triple. `None` on a clean end of stream.
///
/// # Errors
///
/// [`DbError::CorruptRecord`] if the stream ends inside the triple, or any
/// codec error.
pub(crate) fn read_triple<R: Read + ?Sized>(
    source: &mut R,
    chain: &mut CbcChain,
    limit: u64,
) -> Result<Option<[Field; 3]>, DbError> {
    let Some(name) = decode_field(source, chain, limit)? else {
        return Ok(None);
    };
    let mut next = || -> Result<Field, DbError> {
        decode_field(&mut *source, &mut *chain, limit)?.ok_or_else(|| {
            DbError::CorruptRecord("stream ended inside a name/password/notes triple".into())
        })
    };
    let password = next()?;
    let notes = next()?;
    Ok(Some([name, password, notes]))
}

/// Whether a triple is the V2 marker.
pub(crate) fn is_v2_marker(triple: &[Field; 3]) -> bool {
    triple[0].value == V2_MARKER_NAME.as_bytes()
        && (triple[1].value == V2_MARKER_PASSWORD.as_bytes()
            || triple[1].value == V2_MARKER_PASSWORD_PRE.as_bytes())
}

/// Pick V1 or V2 from the caller's request and the presence of the marker.
///
/// # Errors
///
/// [`DbError::NotThisFormat`] if an explicit version contradicts the file.
pub(crate) fn settle_version(
    requested: Option<FormatVersion>,
    marker: bool,
) -> Result<FormatVersion, DbError> {
    match (requested, marker) {
        (None | Some(FormatVersion::V2), true) => Ok(FormatVersion::V2),
        (None | Some(FormatVersion::V1), false) => Ok(FormatVersion::V1),
        _ => Err(DbError::NotThisFormat),
    }
}

/// Turn a triple into a record, reassigning tags by position.
fn triple_record(mut triple: [Field; 3]) -> Record {
    let mut record = Record::new();
    record.set(FieldType::NAME, std::mem::take(&mut triple[0].value));
    record.set(FieldType::PASSWORD, std::mem::take(&mut triple[1].value));
    record.set(FieldType::NOTES, std::mem::take(&mut triple[2].value));
    record
}

/// Split a V1 name into title and user at [`V1_NAME_SEPARATOR`].
#[must_use]
pub fn split_v1_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(V1_NAME_SEPARATOR) {
        Some((title, user)) => (title, Some(user)),
        None => (name, None),
    }
}

/// Name stored for `record` in a V1 file.
///
/// An explicit name wins. Otherwise `group.title`, followed by the
/// separator and the user when there is one.
#[must_use]
pub fn compose_v1_name(record: &Record) -> String {
    if let Some(name) = record.text(FieldType::NAME) {
        return name.to_owned();
    }
    let title = record.text(FieldType::TITLE).unwrap_or_default();
    let mut name = match record.text(FieldType::GROUP) {
        Some(group) if !group.is_empty() => format!("{group}.{title}"),
        _ => title.to_owned(),
    };
    if let Some(user) = record.text(FieldType::USER).filter(|u| !u.is_empty()) {
        name.push(V1_NAME_SEPARATOR);
        name.push_str(user);
    }
    name
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read side of an open V1 or V2 container.
pub struct LegacyReader {
    source: BufReader<File>,
    chain: CbcChain,
    limit: u64,
    version: FormatVersion,
    pending: Option<Record>,
}

impl LegacyReader {
    /// Authenticate and settle V1 versus V2.
    ///
    /// With `requested == None` the first triple decides: the V2 marker
    /// means V2, anything else is the first V1 entry. An explicit version
    /// that disagrees with the marker is [`DbError::NotThisFormat`].
    ///
    /// # Errors
    ///
    /// Anything [`authenticate`] returns, plus codec errors from the first
    /// triple.
    pub fn open(
        file: File,
        file_len: u64,
        passphrase: &[u8],
        requested: Option<FormatVersion>,
        config: &ContainerConfig,
    ) -> Result<(Self, HeaderRecord), DbError> {
        let mut source = BufReader::new(file);
        let (_, mut chain) = authenticate(&mut source, file_len, passphrase)?;
        let limit = config.max_field_len.min(file_len);

        let first = read_triple(&mut source, &mut chain, limit)?;
        let marker = first.as_ref().is_some_and(is_v2_marker);
        let version = settle_version(requested, marker)?;

        let profile = version.profile();
        let mut header = HeaderRecord {
            major: profile.major,
            minor: profile.minor,
            ..HeaderRecord::default()
        };
        let mut pending = None;
        match first {
            Some(mut triple) if marker => {
                match String::from_utf8(std::mem::take(&mut triple[2].value)) {
                    Ok(prefs) => header.preferences = prefs,
                    Err(raw) => header
                        .unknown_fields
                        .push(Field::new(tag::PREFERENCES, raw.into_bytes())),
                }
            }
            Some(triple) => pending = Some(triple_record(triple)),
            None => {}
        }
        tracing::debug!(%version, "opened legacy container");

        Ok((
            Self {
                source,
                chain,
                limit,
                version,
                pending,
            },
            header,
        ))
    }

    /// Version settled at open.
    #[must_use]
    pub const fn version(&self) -> FormatVersion {
        self.version
    }

    /// Next entry record, or `None` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Codec errors.
    pub fn read_record(&mut self) -> Result<Option<Record>, DbError> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        match self.version {
            FormatVersion::V1 => Ok(read_triple(&mut self.source, &mut self.chain, self.limit)?
                .map(triple_record)),
            _ => Ok(
                decode_record(&mut self.source, &mut self.chain, self.limit, |_| {})?
                    .map(|fields| Record::from_wire(fields, FieldSet::V2)),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write side of an open V1 or V2 container.
pub struct LegacyWriter {
    sink: BufWriter<File>,
    chain: CbcChain,
    version: FormatVersion,
}

impl LegacyWriter {
    /// Write the pre-amble and, for V2, the marker triple carrying the
    /// header preferences.
    ///
    /// # Errors
    ///
    /// Cipher or I/O errors.
    pub fn start(
        file: File,
        passphrase: &[u8],
        version: FormatVersion,
        header: &HeaderRecord,
        rng: &mut dyn SecureRng,
    ) -> Result<Self, DbError> {
        let preamble = LegacyPreamble::generate(passphrase, rng)?;

        let mut writer = Self {
            sink: BufWriter::new(file),
            chain: legacy_chain(passphrase, &preamble.salt, &preamble.iv)?,
            version,
        };
        writer.sink.write_all(&preamble.to_bytes())?;

        if version == FormatVersion::V2 {
            let prefs = header
                .unknown_fields
                .iter()
                .find(|f| f.tag == tag::PREFERENCES)
                .map_or(header.preferences.as_bytes(), |f| f.value.as_slice());
            writer.write_triple(
                [
                    Field::new(FieldType::NAME, V2_MARKER_NAME),
                    Field::new(FieldType::PASSWORD, V2_MARKER_PASSWORD),
                    Field::new(FieldType::NOTES, prefs),
                ],
                rng,
            )?;
        }
        tracing::debug!(%version, "created legacy container");
        Ok(writer)
    }

    fn write_triple(&mut self, triple: [Field; 3], rng: &mut dyn SecureRng) -> Result<(), DbError> {
        let mut out = Vec::new();
        for field in &triple {
            encode_field(&mut self.chain, rng, field, &mut out)?;
        }
        self.sink.write_all(&out)?;
        Ok(())
    }

    /// Encrypt and write one record in the version's layout.
    ///
    /// V1 keeps only name, password and notes. V2 drops known fields it
    /// has no tag for and keeps unknown fields in place.
    ///
    /// # Errors
    ///
    /// Codec or I/O errors.
    pub fn write_record(
        &mut self,
        record: &Record,
        rng: &mut dyn SecureRng,
    ) -> Result<(), DbError> {
        if self.version == FormatVersion::V1 {
            let dropped = record
                .fields()
                .iter()
                .filter(|f| !FieldSet::V1.contains(f.tag))
                .count()
                .saturating_add(record.unknown_fields().len());
            if dropped > 0 {
                tracing::debug!(dropped, "fields without a V1 slot not written");
            }
            let triple = [
                Field::new(FieldType::NAME, compose_v1_name(record)),
                Field::new(
                    FieldType::PASSWORD,
                    record
                        .get(FieldType::PASSWORD)
                        .map(|f| f.value.clone())
                        .unwrap_or_default(),
                ),
                Field::new(
                    FieldType::NOTES,
                    record
                        .get(FieldType::NOTES)
                        .map(|f| f.value.clone())
                        .unwrap_or_default(),
                ),
            ];
            return self.write_triple(triple, rng);
        }

        let is_unknown =
            |f: &Field| record.unknown_fields().iter().any(|u| std::ptr::eq(&u.field, f));
        let fields: Vec<&Field> = record
            .wire_fields()
            .into_iter()
            .filter(|f| FieldSet::V2.contains(f.tag) || is_unknown(f))
            .collect();
        let dropped = record
            .fields()
            .len()
            .saturating_add(record.unknown_fields().len())
            .saturating_sub(fields.len());
        if dropped > 0 {
            tracing::debug!(dropped, "fields without a V2 tag not written");
        }

        let mut out = Vec::new();
        encode_record(&mut self.chain, rng, &fields, &mut out, |_| {})?;
        self.sink.write_all(&out)?;
        Ok(())
    }

    /// Flush and sync.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] on flush or sync failure.
    pub fn finish(self) -> Result<(), DbError> {
        let file = self
            .sink
            .into_inner()
            .map_err(std::io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(())
    }

    /// Best-effort flush of whatever is buffered.
    pub fn abandon(mut self) {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(error = %e, "flush failed while abandoning legacy container");
        }
    }
}
