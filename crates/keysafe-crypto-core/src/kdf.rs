//! Passphrase stretching and verification.
//!
//! This module provides:
//! - [`stretch_key`]: iterated SHA-256 over passphrase and salt (V3 key)
//! - [`verification_hash`] / [`verify_passphrase`]: the stored passphrase check
//! - [`mac_key`]: key for the V3 HMAC-SHA256 integrity tag
//! - [`legacy_passkey_hash`] / [`legacy_cipher_key`]: the SHA-1 based checks
//!   of the legacy formats and the single-file encryptor
//!
//! # Cost
//!
//! The iteration count is stored in the file header. Checking a passphrase
//! costs exactly as many rounds as opening the file.

use ring::digest::{self, Context, SHA1_FOR_LEGACY_USE_ONLY, SHA256};
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::{BlockCipher, CipherKind, BLOWFISH_BLOCK_LEN};
use crate::error::CryptoError;
use crate::memory::SecretBytes;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Stretched key length (SHA-256 output, Twofish-256 key).
pub const KEY_LEN: usize = 32;

/// Salt length stored in a V3 pre-amble.
pub const SALT_LEN: usize = 32;

/// Lowest iteration count accepted for a V3 file.
pub const MIN_ITERATIONS: u32 = 2048;

/// Highest iteration count a writer will choose on its own.
///
/// Larger values are still honoured when read from a file.
pub const MAX_USABLE_ITERATIONS: u32 = 1 << 22;

/// SHA-1 output length, used by the legacy checks.
pub const LEGACY_HASH_LEN: usize = 20;

/// Random prefix length of the legacy passkey check.
pub const LEGACY_STUFF_LEN: usize = 8;

/// Self-encryption rounds of the legacy passkey check.
const LEGACY_ROUNDS: usize = 1000;

const VERIFIER_LABEL: &[u8] = b"keysafe-v3-passphrase-check";
const MAC_LABEL: &[u8] = b"keysafe-v3-record-mac";

// ---------------------------------------------------------------------------
// V3 stretching
// ---------------------------------------------------------------------------

/// Stretch `passphrase` with `salt` over `iterations` SHA-256 rounds.
///
/// `X = SHA-256(passphrase || salt)`, then `iterations` times
/// `X = SHA-256(X)`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `iterations` is below
/// [`MIN_ITERATIONS`] or `salt` is empty.
pub fn stretch_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<SecretBytes<KEY_LEN>, CryptoError> {
    if iterations < MIN_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "iteration count {iterations} below minimum {MIN_ITERATIONS}"
        )));
    }
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("salt must not be empty".into()));
    }

    let mut ctx = Context::new(&SHA256);
    ctx.update(passphrase);
    ctx.update(salt);
    let mut x = [0u8; KEY_LEN];
    x.copy_from_slice(ctx.finish().as_ref());

    for _ in 0..iterations {
        let next = digest::digest(&SHA256, &x);
        x.copy_from_slice(next.as_ref());
    }

    let key = SecretBytes::new(x);
    x.zeroize();
    Ok(key)
}

/// Hash stored beside the salt so a passphrase can be checked without
/// decrypting anything.
#[must_use]
pub fn verification_hash(key: &SecretBytes<KEY_LEN>) -> [u8; KEY_LEN] {
    labelled_sha256(key.expose(), VERIFIER_LABEL)
}

/// Key for the V3 record HMAC, derived from the stretched key.
#[must_use]
pub fn mac_key(key: &SecretBytes<KEY_LEN>) -> SecretBytes<KEY_LEN> {
    let mut out = labelled_sha256(key.expose(), MAC_LABEL);
    let k = SecretBytes::new(out);
    out.zeroize();
    k
}

/// Re-stretch `passphrase` and compare against `stored` in constant time.
///
/// Returns the stretched key on a match so callers do not pay for a second
/// stretch, or `None` on mismatch.
///
/// # Errors
///
/// Propagates [`stretch_key`] failures.
pub fn verify_passphrase(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
    stored: &[u8],
) -> Result<Option<SecretBytes<KEY_LEN>>, CryptoError> {
    let key = stretch_key(passphrase, salt, iterations)?;
    let mut candidate = verification_hash(&key);
    let matched = constant_time_eq(&candidate, stored);
    candidate.zeroize();
    Ok(matched.then_some(key))
}

/// Constant-time byte comparison. No early exit on the first differing byte.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn labelled_sha256(key: &[u8], label: &[u8]) -> [u8; KEY_LEN] {
    let mut ctx = Context::new(&SHA256);
    ctx.update(key);
    ctx.update(label);
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

// ---------------------------------------------------------------------------
// Legacy checks
// ---------------------------------------------------------------------------

/// Passkey check of the legacy formats.
///
/// `SHA-1(stuff || 00 00 || passphrase)` keys Blowfish, which encrypts the
/// first block of that buffer 1000 times; the result is the SHA-1 of the
/// whole 10-byte buffer. Not iterated in the modern sense.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the Blowfish schedule
/// cannot be built (never for a 20-byte SHA-1 key).
pub fn legacy_passkey_hash(
    passphrase: &[u8],
    stuff: &[u8; LEGACY_STUFF_LEN],
) -> Result<[u8; LEGACY_HASH_LEN], CryptoError> {
    let mut buf = Zeroizing::new([0u8; LEGACY_STUFF_LEN + 2]);
    buf[..LEGACY_STUFF_LEN].copy_from_slice(stuff);

    let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(&buf[..]);
    ctx.update(passphrase);
    let mut temp_key = Zeroizing::new([0u8; LEGACY_HASH_LEN]);
    temp_key.copy_from_slice(ctx.finish().as_ref());

    let cipher = BlockCipher::new(CipherKind::Blowfish, &temp_key[..])?;
    for _ in 0..LEGACY_ROUNDS {
        cipher.encrypt_block(&mut buf[..BLOWFISH_BLOCK_LEN])?;
    }

    let mut out = [0u8; LEGACY_HASH_LEN];
    out.copy_from_slice(digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, &buf[..]).as_ref());
    Ok(out)
}

/// Blowfish key of the legacy formats: `SHA-1(passphrase || salt)`.
#[must_use]
pub fn legacy_cipher_key(passphrase: &[u8], salt: &[u8]) -> SecretBytes<LEGACY_HASH_LEN> {
    let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(passphrase);
    ctx.update(salt);
    let mut out = [0u8; LEGACY_HASH_LEN];
    out.copy_from_slice(ctx.finish().as_ref());
    let key = SecretBytes::new(out);
    out.zeroize();
    key
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
