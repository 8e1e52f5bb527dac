//! Encrypted TLV field codec shared by every format version.
//!
//! Plaintext layout of one field before CBC encryption:
//!
//! ```text
//! tag: u16 LE | length: u32 LE | value[length] | random padding to block
//! ```
//!
//! Fields are encrypted through the container's running [`CbcChain`], so
//! the whole data region of a file is one continuous CBC stream.

use std::io::Read;

use keysafe_crypto_core::{read_chained, CbcChain, CryptoError, SecureRng};
use zeroize::Zeroizing;

use crate::error::DbError;
use crate::field::{Field, FieldType};

/// Bytes of tag and length ahead of each value.
pub const FIELD_PREFIX_LEN: usize = 6;

/// Append the encrypted form of `field` to `out`.
///
/// # Errors
///
/// Returns [`DbError::MalformedLength`] if the value does not fit the 32-bit
/// length prefix, or a cipher error.
pub fn encode_field(
    chain: &mut CbcChain,
    rng: &mut dyn SecureRng,
    field: &Field,
    out: &mut Vec<u8>,
) -> Result<(), DbError> {
    let len = u32::try_from(field.value.len()).map_err(|_| DbError::MalformedLength {
        length: u64::try_from(field.value.len()).unwrap_or(u64::MAX),
        limit: u64::from(u32::MAX),
    })?;
    let body = FIELD_PREFIX_LEN.saturating_add(field.value.len());
    let mut buf = Zeroizing::new(vec![0u8; chain.padded_len(body)]);
    buf[..2].copy_from_slice(&field.tag.0.to_le_bytes());
    buf[2..FIELD_PREFIX_LEN].copy_from_slice(&len.to_le_bytes());
    buf[FIELD_PREFIX_LEN..body].copy_from_slice(&field.value);
    rng.fill_bytes(&mut buf[body..]);

    chain.encrypt_blocks(&mut buf)?;
    out.extend_from_slice(&buf);
    Ok(())
}

/// Append `fields` followed by an end marker to `out`.
///
/// `observe` sees each plaintext field, the end marker included. Fields are
/// checked before anything is encrypted, so a rejected record leaves the
/// chain untouched.
///
/// # Errors
///
/// - [`DbError::CorruptRecord`] if a field carries the end-marker tag
/// - [`DbError::MalformedLength`] if a value exceeds the length prefix
pub fn encode_record<F>(
    chain: &mut CbcChain,
    rng: &mut dyn SecureRng,
    fields: &[&Field],
    out: &mut Vec<u8>,
    mut observe: F,
) -> Result<(), DbError>
where
    F: FnMut(&Field),
{
    for &field in fields {
        if field.tag.is_end() {
            return Err(DbError::CorruptRecord(
                "end marker inside record fields".into(),
            ));
        }
        if u32::try_from(field.value.len()).is_err() {
            return Err(DbError::MalformedLength {
                length: u64::try_from(field.value.len()).unwrap_or(u64::MAX),
                limit: u64::from(u32::MAX),
            });
        }
    }
    for &field in fields {
        observe(field);
        encode_field(chain, rng, field, out)?;
    }
    let end = Field::end();
    observe(&end);
    encode_field(chain, rng, &end, out)
}

/// Read and decrypt one field.
///
/// Returns `Ok(None)` when the source is exhausted exactly at a field
/// boundary.
///
/// # Errors
///
/// - [`DbError::MalformedLength`] if the declared length exceeds `limit`;
///   checked before any allocation for the value
/// - [`DbError::TruncatedStream`] if the source ends inside a field
/// - [`DbError::Io`] on read failure
pub fn decode_field<R: Read + ?Sized>(
    source: &mut R,
    chain: &mut CbcChain,
    limit: u64,
) -> Result<Option<Field>, DbError> {
    let bs = chain.block_len();
    let first = match read_chained(source, chain, bs) {
        Ok(block) => block,
        Err(CryptoError::TruncatedStream { actual: 0, .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let tag = FieldType(u16::from_le_bytes([first[0], first[1]]));
    let declared = u32::from_le_bytes([first[2], first[3], first[4], first[5]]);
    if u64::from(declared) > limit {
        return Err(DbError::MalformedLength {
            length: u64::from(declared),
            limit,
        });
    }
    let len = usize::try_from(declared).map_err(|_| DbError::MalformedLength {
        length: u64::from(declared),
        limit,
    })?;

    let body = FIELD_PREFIX_LEN.saturating_add(len);
    let mut value = Vec::with_capacity(len);
    let in_first = body.min(bs);
    value.extend_from_slice(&first[FIELD_PREFIX_LEN..in_first]);

    let remaining = body.saturating_sub(bs);
    if remaining > 0 {
        let rest = read_chained(source, chain, remaining)?;
        value.extend_from_slice(&rest[..remaining]);
    }
    Ok(Some(Field { tag, value }))
}

/// Read fields up to and including the end marker.
///
/// Returns `Ok(None)` on a clean end of stream before the first field. The
/// end marker itself is not part of the returned list, but `observe` sees
/// it.
///
/// # Errors
///
/// - [`DbError::CorruptRecord`] if the stream ends before the end marker
///   or the end marker carries a value
/// - anything [`decode_field`] returns
pub fn decode_record<R, F>(
    source: &mut R,
    chain: &mut CbcChain,
    limit: u64,
    mut observe: F,
) -> Result<Option<Vec<Field>>, DbError>
where
    R: Read + ?Sized,
    F: FnMut(&Field),
{
    let mut fields = Vec::new();
    loop {
        match decode_field(source, chain, limit)? {
            None if fields.is_empty() => return Ok(None),
            None => {
                return Err(DbError::CorruptRecord(format!(
                    "stream ended after {} fields without an end marker",
                    fields.len()
                )))
            }
            Some(field) => {
                if field.tag.is_end() && !field.value.is_empty() {
                    return Err(DbError::CorruptRecord(format!(
                        "end marker declares {} value bytes",
                        field.value.len()
                    )));
                }
                observe(&field);
                if field.tag.is_end() {
                    return Ok(Some(fields));
                }
                fields.push(field);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keysafe_crypto_core::{BlockCipher, CipherKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn chain() -> CbcChain {
        let cipher = BlockCipher::new(CipherKind::Twofish, &[0x33; 32]).unwrap();
        CbcChain::new(cipher, &[0x44; 16]).unwrap()
    }

    fn encode(fields: &[Field]) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(5);
        let mut enc = chain();
        let mut out = Vec::new();
        let refs: Vec<&Field> = fields.iter().collect();
        encode_record(&mut enc, &mut rng, &refs, &mut out, |_| {}).unwrap();
        out
    }

    #[test]
    fn short_field_fits_one_block() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = Vec::new();
        encode_field(
            &mut chain(),
            &mut rng,
            &Field::new(FieldType::TITLE, "a-title"),
            &mut out,
        )
        .unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn long_field_spans_blocks() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = Vec::new();
        let field = Field::new(FieldType::NOTES, vec![b'n'; 27]);
        encode_field(&mut chain(), &mut rng, &field, &mut out).unwrap();
        assert_eq!(out.len(), 48);

        let mut dec = chain();
        let back = decode_field(&mut Cursor::new(out), &mut dec, 1024)
            .unwrap()
            .unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn record_roundtrip_with_observer() {
        let fields = vec![
            Field::new(FieldType::TITLE, "a-title"),
            Field::new(FieldType::PASSWORD, "b-password!?"),
        ];
        let bytes = encode(&fields);

        let mut seen = Vec::new();
        let mut dec = chain();
        let back = decode_record(&mut Cursor::new(bytes), &mut dec, 1024, |f| {
            seen.push(f.tag);
        })
        .unwrap()
        .unwrap();
        assert_eq!(back, fields);
        assert_eq!(
            seen,
            vec![FieldType::TITLE, FieldType::PASSWORD, FieldType::END]
        );
    }

    #[test]
    fn empty_stream_is_clean_end() {
        let mut dec = chain();
        let out = decode_record(&mut Cursor::new(Vec::new()), &mut dec, 1024, |_| {}).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn missing_end_marker_is_corrupt() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut enc = chain();
        let mut out = Vec::new();
        encode_field(
            &mut enc,
            &mut rng,
            &Field::new(FieldType::TITLE, "t"),
            &mut out,
        )
        .unwrap();

        let mut dec = chain();
        let err = decode_record(&mut Cursor::new(out), &mut dec, 1024, |_| {}).unwrap_err();
        assert!(matches!(err, DbError::CorruptRecord(_)));
    }

    #[test]
    fn end_marker_with_value_is_corrupt() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut enc = chain();
        let mut out = Vec::new();
        for field in [
            Field::new(FieldType::TITLE, "t"),
            Field::new(FieldType::END, "junk"),
        ] {
            encode_field(&mut enc, &mut rng, &field, &mut out).unwrap();
        }

        let mut dec = chain();
        let err = decode_record(&mut Cursor::new(out), &mut dec, 1024, |_| {}).unwrap_err();
        assert!(matches!(err, DbError::CorruptRecord(_)));
    }

    #[test]
    fn oversized_length_rejected_before_reading_value() {
        let field = Field::new(FieldType::NOTES, vec![0u8; 100]);
        let bytes = encode(std::slice::from_ref(&field));
        let mut dec = chain();
        let err = decode_field(&mut Cursor::new(bytes), &mut dec, 50).unwrap_err();
        assert!(matches!(
            err,
            DbError::MalformedLength {
                length: 100,
                limit: 50
            }
        ));
    }

    #[test]
    fn partial_block_is_truncated() {
        let bytes = encode(&[Field::new(FieldType::NOTES, vec![0u8; 40])]);
        let mut dec = chain();
        let err = decode_field(&mut Cursor::new(&bytes[..20]), &mut dec, 1024).unwrap_err();
        assert!(matches!(err, DbError::TruncatedStream { .. }));
    }

    #[test]
    fn end_marker_inside_fields_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = Vec::new();
        let end = Field::end();
        let err = encode_record(&mut chain(), &mut rng, &[&end], &mut out, |_| {}).unwrap_err();
        assert!(matches!(err, DbError::CorruptRecord(_)));
    }

    #[test]
    fn padding_is_random() {
        let field = Field::new(FieldType::TITLE, "x");
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode_field(&mut chain(), &mut StdRng::seed_from_u64(1), &field, &mut a).unwrap();
        encode_field(&mut chain(), &mut StdRng::seed_from_u64(2), &field, &mut b).unwrap();
        assert_ne!(a, b);
    }
}
