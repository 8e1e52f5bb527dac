//! `keysafe-crypto-core`: cryptographic primitives for keysafe databases.
//!
//! Block ciphers, CBC chaining, passphrase stretching and zeroizing secret
//! containers. No file formats live here; those belong to `keysafe-db`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;
pub mod rng;

pub mod cbc;
pub mod cipher;

pub mod kdf;

pub use cbc::{read_chained, write_chained, CbcChain};
pub use cipher::{BlockCipher, CipherKind, BLOWFISH_BLOCK_LEN, TWOFISH_BLOCK_LEN};
pub use error::CryptoError;
pub use kdf::{
    constant_time_eq, legacy_cipher_key, legacy_passkey_hash, mac_key, stretch_key,
    verification_hash, verify_passphrase, KEY_LEN, LEGACY_HASH_LEN, LEGACY_STUFF_LEN,
    MAX_USABLE_ITERATIONS, MIN_ITERATIONS, SALT_LEN,
};
pub use memory::{SecretBuffer, SecretBytes};
pub use rng::SecureRng;
