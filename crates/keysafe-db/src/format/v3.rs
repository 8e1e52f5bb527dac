//! V3 container layout.
//!
//! ```text
//! "KSF3" | salt[32] | iterations u32 LE | verifier[32] | IV[16]
//! | header record ... END | entry records ... | "KSF3-EOFKSF3-EOF" | HMAC[32]
//! ```
//!
//! Everything between the IV and the EOF block is one Twofish-CBC stream.
//! The HMAC-SHA256 covers the tag, length and value of every field in that
//! stream, end markers included.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Take, Write};

use keysafe_crypto_core::{
    constant_time_eq, mac_key, verification_hash, verify_passphrase, BlockCipher, CbcChain,
    CipherKind, SecretBytes, SecureRng, KEY_LEN, MIN_ITERATIONS, SALT_LEN, TWOFISH_BLOCK_LEN,
};
use ring::hmac;

use crate::codec::{decode_record, encode_record};
use crate::config::ContainerConfig;
use crate::error::DbError;
use crate::field::{Field, FieldSet, Record};
use crate::header::HeaderRecord;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic at offset zero.
pub const TAG: &[u8; 4] = b"KSF3";

/// Plaintext block that ends the data region.
pub const EOF_BLOCK: &[u8; 16] = b"KSF3-EOFKSF3-EOF";

/// HMAC-SHA256 tag length.
pub const MAC_LEN: usize = 32;

/// Tag, salt, iteration count, verifier and IV.
pub const PREAMBLE_LEN: usize = 4 + SALT_LEN + 4 + KEY_LEN + TWOFISH_BLOCK_LEN;

/// EOF block and HMAC.
pub const POSTAMBLE_LEN: usize = EOF_BLOCK.len() + MAC_LEN;

/// Shortest byte count a V3 file can have.
pub const MIN_FILE_LEN: usize = PREAMBLE_LEN + POSTAMBLE_LEN;

// ---------------------------------------------------------------------------
// Pre-amble
// ---------------------------------------------------------------------------

/// The plaintext fields ahead of the encrypted stream.
#[derive(Debug, Clone)]
pub struct Preamble {
    /// Stretch salt.
    pub salt: [u8; SALT_LEN],
    /// Stretch rounds.
    pub iterations: u32,
    /// Passphrase verifier.
    pub verifier: [u8; KEY_LEN],
    /// CBC initialisation vector.
    pub iv: [u8; TWOFISH_BLOCK_LEN],
}

impl Preamble {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREAMBLE_LEN);
        out.extend_from_slice(TAG);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iterations.to_le_bytes());
        out.extend_from_slice(&self.verifier);
        out.extend_from_slice(&self.iv);
        out
    }

    fn read_after_tag<R: Read>(source: &mut R) -> Result<Self, DbError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iterations = [0u8; 4];
        let mut verifier = [0u8; KEY_LEN];
        let mut iv = [0u8; TWOFISH_BLOCK_LEN];
        source.read_exact(&mut salt)?;
        source.read_exact(&mut iterations)?;
        source.read_exact(&mut verifier)?;
        source.read_exact(&mut iv)?;
        Ok(Self {
            salt,
            iterations: u32::from_le_bytes(iterations),
            verifier,
            iv,
        })
    }
}

/// `true` if `file` starts with the V3 tag. Leaves the cursor at zero.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the file cannot be read or rewound.
pub fn has_tag(file: &mut File) -> Result<bool, DbError> {
    let mut magic = [0u8; 4];
    file.seek(SeekFrom::Start(0))?;
    let mut filled = 0usize;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled = filled.saturating_add(n);
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(filled == magic.len() && &magic == TAG)
}

/// Validate the framing of a V3 file and check the passphrase.
///
/// Reads only the pre-amble and the EOF block; no record is decrypted.
/// Returns the pre-amble, the stretched key and the stored HMAC.
///
/// # Errors
///
/// - [`DbError::NotThisFormat`] if the tag is missing
/// - [`DbError::TruncatedStream`] if the file is too short or lacks the EOF block
/// - [`DbError::InvalidIterations`] if the stored count is below the floor
/// - [`DbError::WrongPassword`] if the verifier does not match
pub fn authenticate(
    file: &mut File,
    file_len: u64,
    passphrase: &[u8],
) -> Result<(Preamble, SecretBytes<KEY_LEN>, [u8; MAC_LEN]), DbError> {
    if !has_tag(file)? {
        return Err(DbError::NotThisFormat);
    }
    let len = usize::try_from(file_len).unwrap_or(usize::MAX);
    if len < MIN_FILE_LEN {
        return Err(DbError::TruncatedStream {
            expected: MIN_FILE_LEN,
            actual: len,
        });
    }

    let post_len = u64::try_from(POSTAMBLE_LEN).unwrap_or(u64::MAX);
    file.seek(SeekFrom::Start(file_len.saturating_sub(post_len)))?;
    let mut eof = [0u8; 16];
    let mut stored_mac = [0u8; MAC_LEN];
    file.read_exact(&mut eof)?;
    file.read_exact(&mut stored_mac)?;
    if &eof != EOF_BLOCK {
        return Err(DbError::TruncatedStream {
            expected: len,
            actual: len.saturating_sub(POSTAMBLE_LEN),
        });
    }

    file.seek(SeekFrom::Start(4))?;
    let preamble = Preamble::read_after_tag(file)?;
    if preamble.iterations < MIN_ITERATIONS {
        return Err(DbError::InvalidIterations(preamble.iterations));
    }
    let key = verify_passphrase(
        passphrase,
        &preamble.salt,
        preamble.iterations,
        &preamble.verifier,
    )?
    .ok_or(DbError::WrongPassword)?;
    Ok((preamble, key, stored_mac))
}

fn mac_field(mac: &mut hmac::Context, field: &Field) {
    let len = u32::try_from(field.value.len()).unwrap_or(u32::MAX);
    mac.update(&field.tag.0.to_le_bytes());
    mac.update(&len.to_le_bytes());
    mac.update(&field.value);
}

fn session_keys(
    key: &SecretBytes<KEY_LEN>,
    iv: &[u8],
) -> Result<(CbcChain, hmac::Context), DbError> {
    let cipher = BlockCipher::new(CipherKind::Twofish, key.expose())?;
    let chain = CbcChain::new(cipher, iv)?;
    let mk = mac_key(key);
    let mac = hmac::Context::with_key(&hmac::Key::new(hmac::HMAC_SHA256, mk.expose()));
    Ok((chain, mac))
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read side of an open V3 container.
pub struct V3Reader {
    source: Take<BufReader<File>>,
    chain: CbcChain,
    mac: hmac::Context,
    stored_mac: [u8; MAC_LEN],
    limit: u64,
    verified: bool,
}

impl V3Reader {
    /// Authenticate, then decode the header record.
    ///
    /// # Errors
    ///
    /// Anything [`authenticate`] returns, plus codec errors from the header
    /// and [`DbError::CorruptRecord`] if the header is missing.
    pub fn open(
        mut file: File,
        file_len: u64,
        passphrase: &[u8],
        config: &ContainerConfig,
    ) -> Result<(Self, HeaderRecord), DbError> {
        let (preamble, key, stored_mac) = authenticate(&mut file, file_len, passphrase)?;
        let (chain, mac) = session_keys(&key, &preamble.iv)?;

        let fixed = u64::try_from(MIN_FILE_LEN).unwrap_or(u64::MAX);
        let data_len = file_len.saturating_sub(fixed);
        file.seek(SeekFrom::Start(
            u64::try_from(PREAMBLE_LEN).unwrap_or(u64::MAX),
        ))?;

        let mut reader = Self {
            source: BufReader::new(file).take(data_len),
            chain,
            mac,
            stored_mac,
            limit: config.max_field_len.min(file_len),
            verified: false,
        };

        let Some(fields) = reader.next_fields()? else {
            return Err(DbError::CorruptRecord("header record missing".into()));
        };
        let mut header = HeaderRecord::from_fields(fields)?;
        header.iterations = preamble.iterations;
        tracing::debug!(
            iterations = preamble.iterations,
            major = header.major,
            minor = header.minor,
            "opened V3 container"
        );
        Ok((reader, header))
    }

    fn next_fields(&mut self) -> Result<Option<Vec<Field>>, DbError> {
        let mac = &mut self.mac;
        decode_record(&mut self.source, &mut self.chain, self.limit, |f| {
            mac_field(mac, f);
        })
    }

    /// Next entry record, or `None` once the data region is exhausted and
    /// the HMAC has been checked.
    ///
    /// # Errors
    ///
    /// Codec errors, or [`DbError::IntegrityMismatch`] at end of data when
    /// the HMAC does not match.
    pub fn read_record(&mut self) -> Result<Option<Record>, DbError> {
        if self.verified {
            return Ok(None);
        }
        if let Some(fields) = self.next_fields()? {
            return Ok(Some(Record::from_wire(fields, FieldSet::V3)));
        }
        let computed = self.mac.clone().sign();
        if !constant_time_eq(computed.as_ref(), &self.stored_mac) {
            tracing::warn!("V3 record HMAC mismatch");
            return Err(DbError::IntegrityMismatch);
        }
        self.verified = true;
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write side of an open V3 container.
pub struct V3Writer {
    sink: BufWriter<File>,
    chain: CbcChain,
    mac: hmac::Context,
}

impl V3Writer {
    /// Derive a fresh key and write the pre-amble and header record.
    ///
    /// `header.iterations` decides the stretch cost.
    ///
    /// # Errors
    ///
    /// Key derivation, cipher or I/O errors.
    pub fn start(
        file: File,
        passphrase: &[u8],
        header: &HeaderRecord,
        rng: &mut dyn SecureRng,
    ) -> Result<Self, DbError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; TWOFISH_BLOCK_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let key = keysafe_crypto_core::stretch_key(passphrase, &salt, header.iterations)?;
        let preamble = Preamble {
            salt,
            iterations: header.iterations,
            verifier: verification_hash(&key),
            iv,
        };
        let (chain, mac) = session_keys(&key, &iv)?;

        let mut writer = Self {
            sink: BufWriter::new(file),
            chain,
            mac,
        };
        writer.sink.write_all(&preamble.to_bytes())?;

        let fields = header.to_fields();
        let refs: Vec<&Field> = fields.iter().collect();
        writer.emit(&refs, rng)?;
        tracing::debug!(iterations = header.iterations, "created V3 container");
        Ok(writer)
    }

    fn emit(&mut self, fields: &[&Field], rng: &mut dyn SecureRng) -> Result<(), DbError> {
        let mut out = Vec::new();
        let mut mac = self.mac.clone();
        encode_record(&mut self.chain, rng, fields, &mut out, |f| {
            mac_field(&mut mac, f);
        })?;
        self.sink.write_all(&out)?;
        self.mac = mac;
        Ok(())
    }

    /// Encrypt and write one record in a single write.
    ///
    /// # Errors
    ///
    /// Validation errors leave the stream untouched; I/O errors leave it in
    /// an unknown state.
    pub fn write_record(
        &mut self,
        record: &Record,
        rng: &mut dyn SecureRng,
    ) -> Result<(), DbError> {
        self.emit(&record.wire_fields(), rng)
    }

    /// Write the EOF block and HMAC, then flush to disk.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if any write, flush or sync fails.
    pub fn finish(mut self) -> Result<(), DbError> {
        let tag = self.mac.sign();
        self.sink.write_all(EOF_BLOCK)?;
        self.sink.write_all(tag.as_ref())?;
        let file = self
            .sink
            .into_inner()
            .map_err(std::io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(())
    }

    /// Best-effort flush of whatever is buffered, without the trailer.
    pub fn abandon(mut self) {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(error = %e, "flush failed while abandoning V3 container");
        }
    }
}
