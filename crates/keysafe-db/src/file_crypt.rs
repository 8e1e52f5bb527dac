//! Single-file encryptor.
//!
//! Encrypts an arbitrary file under the legacy Blowfish scheme:
//!
//! ```text
//! stuff[8] | passkey hash[20] | salt[20] | IV[8] | one field (tag 0)
//! ```
//!
//! The passphrase check is the non-iterated legacy hash. This path exists
//! for compatibility with files produced by older tools and is independent
//! of the database containers.

use std::fs;
use std::path::{Path, PathBuf};

use keysafe_crypto_core::{SecretBuffer, SecureRng};

use crate::codec::{decode_field, encode_field};
use crate::error::DbError;
use crate::field::{Field, FieldType};
use crate::format::legacy::{self, LegacyPreamble};

/// Suffix appended by [`encrypt_file`].
pub const SEALED_SUFFIX: &str = ".PSF";

/// Encrypt `plaintext` in memory.
///
/// # Errors
///
/// Key schedule or cipher errors.
pub fn seal(
    plaintext: &[u8],
    passphrase: &[u8],
    rng: &mut dyn SecureRng,
) -> Result<Vec<u8>, DbError> {
    let preamble = LegacyPreamble::generate(passphrase, rng)?;
    let mut chain = legacy::legacy_chain(passphrase, &preamble.salt, &preamble.iv)?;

    let mut out = preamble.to_bytes();
    let field = Field::new(FieldType::NAME, plaintext);
    encode_field(&mut chain, rng, &field, &mut out)?;
    Ok(out)
}

/// Decrypt the output of [`seal`].
///
/// # Errors
///
/// - [`DbError::NotThisFormat`] if `sealed` is shorter than the pre-amble
/// - [`DbError::WrongPassword`] if the passkey hash does not match
/// - [`DbError::CorruptRecord`] if no payload follows the pre-amble
/// - codec errors from the payload
pub fn unseal(sealed: &[u8], passphrase: &[u8]) -> Result<SecretBuffer, DbError> {
    let total = u64::try_from(sealed.len()).unwrap_or(u64::MAX);
    let mut source = sealed;
    let (_, mut chain) = legacy::authenticate(&mut source, total, passphrase)?;
    let mut field = decode_field(&mut source, &mut chain, total)?
        .ok_or_else(|| DbError::CorruptRecord("sealed file has no payload".into()))?;
    Ok(SecretBuffer::from_vec(std::mem::take(&mut field.value)))
}

/// Encrypt the file at `path` into `path.PSF`. Returns the new path.
///
/// The source file is left in place. `rng` supplies the salt, IV and
/// padding.
///
/// # Errors
///
/// - [`DbError::CantOpenFile`] if `path` cannot be read
/// - [`DbError::Io`] if the output cannot be written
pub fn encrypt_file(
    path: impl AsRef<Path>,
    passphrase: &[u8],
    rng: &mut dyn SecureRng,
) -> Result<PathBuf, DbError> {
    let path = path.as_ref();
    let plaintext = SecretBuffer::from_vec(fs::read(path).map_err(|source| {
        DbError::CantOpenFile {
            path: path.to_path_buf(),
            source,
        }
    })?);
    let sealed = seal(plaintext.expose(), passphrase, rng)?;

    let mut out = path.as_os_str().to_owned();
    out.push(SEALED_SUFFIX);
    let out = PathBuf::from(out);
    fs::write(&out, sealed)?;
    tracing::debug!(input = %path.display(), output = %out.display(), "file encrypted");
    Ok(out)
}

/// Decrypt `path` (which must end in `.PSF`) next to itself, without the
/// suffix. Returns the new path.
///
/// # Errors
///
/// - [`DbError::NotThisFormat`] if the name lacks the suffix
/// - [`DbError::CantOpenFile`] if `path` cannot be read
/// - anything [`unseal`] returns
pub fn decrypt_file(path: impl AsRef<Path>, passphrase: &[u8]) -> Result<PathBuf, DbError> {
    let path = path.as_ref();
    let out = strip_sealed_suffix(path).ok_or(DbError::NotThisFormat)?;
    let sealed = fs::read(path).map_err(|source| DbError::CantOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let plaintext = unseal(&sealed, passphrase)?;
    fs::write(&out, plaintext.expose())?;
    tracing::debug!(input = %path.display(), output = %out.display(), "file decrypted");
    Ok(out)
}

fn strip_sealed_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.to_str()?;
    let cut = name.len().checked_sub(SEALED_SUFFIX.len())?;
    let (stem, suffix) = (name.get(..cut)?, name.get(cut..)?);
    (suffix.eq_ignore_ascii_case(SEALED_SUFFIX) && !stem.is_empty()).then(|| PathBuf::from(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seal_unseal_roundtrip() {
        let mut rng = StdRng::seed_from_u64(11);
        let sealed = seal(b"attack at dawn", b"pw", &mut rng).unwrap();
        assert_eq!(sealed.len(), legacy::PREAMBLE_LEN + 24);
        let back = unseal(&sealed, b"pw").unwrap();
        assert_eq!(back.expose(), b"attack at dawn");
        assert_eq!(format!("{back:?}"), "SecretBuffer(***)");
    }

    #[test]
    fn unseal_wrong_passphrase() {
        let mut rng = StdRng::seed_from_u64(11);
        let sealed = seal(b"x", b"right", &mut rng).unwrap();
        assert!(matches!(
            unseal(&sealed, b"wrong"),
            Err(DbError::WrongPassword)
        ));
    }

    #[test]
    fn unseal_short_input() {
        assert!(matches!(
            unseal(&[0u8; 10], b"pw"),
            Err(DbError::NotThisFormat)
        ));
    }

    #[test]
    fn payload_missing() {
        let mut rng = StdRng::seed_from_u64(3);
        let sealed = seal(b"", b"pw", &mut rng).unwrap();
        let head = &sealed[..legacy::PREAMBLE_LEN];
        assert!(matches!(
            unseal(head, b"pw"),
            Err(DbError::CorruptRecord(_))
        ));
    }

    #[test]
    fn suffix_handling() {
        assert_eq!(
            strip_sealed_suffix(Path::new("/t/a.txt.PSF")),
            Some(PathBuf::from("/t/a.txt"))
        );
        assert_eq!(
            strip_sealed_suffix(Path::new("/t/a.txt.psf")),
            Some(PathBuf::from("/t/a.txt"))
        );
        assert_eq!(strip_sealed_suffix(Path::new("/t/a.txt")), None);
        assert_eq!(strip_sealed_suffix(Path::new(".PSF")), None);
    }
}
