//! Block ciphers used by the container formats.
//!
//! Legacy databases and the single-file encryptor use Blowfish (8-byte
//! blocks); V3 databases use Twofish (16-byte blocks). Both are reached
//! through the same [`BlockCipher`] enum so the chaining layer never needs to
//! know which one it drives.

use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use blowfish::Blowfish;
use twofish::Twofish;

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Blowfish block size in bytes.
pub const BLOWFISH_BLOCK_LEN: usize = 8;

/// Twofish block size in bytes.
pub const TWOFISH_BLOCK_LEN: usize = 16;

/// Twofish key length accepted by [`BlockCipher::new`].
pub const TWOFISH_KEY_LEN: usize = 32;

/// Shortest Blowfish key the algorithm allows.
const BLOWFISH_MIN_KEY_LEN: usize = 4;

/// Longest Blowfish key the algorithm allows.
const BLOWFISH_MAX_KEY_LEN: usize = 56;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which algorithm a container is encrypted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    /// 64-bit block Feistel cipher, legacy formats.
    Blowfish,
    /// 128-bit block cipher, V3 format.
    Twofish,
}

impl CipherKind {
    /// Block size of this algorithm in bytes.
    #[must_use]
    pub const fn block_len(self) -> usize {
        match self {
            Self::Blowfish => BLOWFISH_BLOCK_LEN,
            Self::Twofish => TWOFISH_BLOCK_LEN,
        }
    }
}

/// A keyed block cipher instance.
///
/// The key schedules are boxed so the enum stays small when it is moved into
/// a chaining wrapper. Both schedules are wiped when dropped.
pub enum BlockCipher {
    /// Keyed Blowfish schedule.
    Blowfish(Box<Blowfish>),
    /// Keyed Twofish schedule.
    Twofish(Box<Twofish>),
}

impl BlockCipher {
    /// Build the key schedule for `kind` from `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if `key` is not 4..=56
    /// bytes for Blowfish or exactly 32 bytes for Twofish.
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self, CryptoError> {
        match kind {
            CipherKind::Blowfish => {
                if !(BLOWFISH_MIN_KEY_LEN..=BLOWFISH_MAX_KEY_LEN).contains(&key.len()) {
                    return Err(CryptoError::InvalidKeyMaterial(format!(
                        "Blowfish key must be {BLOWFISH_MIN_KEY_LEN}..={BLOWFISH_MAX_KEY_LEN} bytes, got {}",
                        key.len()
                    )));
                }
                let cipher = <Blowfish as KeyInit>::new_from_slice(key)
                    .map_err(|_| CryptoError::InvalidKeyMaterial("Blowfish key rejected".into()))?;
                Ok(Self::Blowfish(Box::new(cipher)))
            }
            CipherKind::Twofish => {
                if key.len() != TWOFISH_KEY_LEN {
                    return Err(CryptoError::InvalidKeyMaterial(format!(
                        "Twofish key must be {TWOFISH_KEY_LEN} bytes, got {}",
                        key.len()
                    )));
                }
                let cipher = <Twofish as KeyInit>::new(GenericArray::from_slice(key));
                Ok(Self::Twofish(Box::new(cipher)))
            }
        }
    }

    /// Algorithm of this instance.
    #[must_use]
    pub const fn kind(&self) -> CipherKind {
        match self {
            Self::Blowfish(_) => CipherKind::Blowfish,
            Self::Twofish(_) => CipherKind::Twofish,
        }
    }

    /// Block size in bytes.
    #[must_use]
    pub const fn block_len(&self) -> usize {
        self.kind().block_len()
    }

    /// Encrypt exactly one block in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Cipher`] if `block` is not one block long.
    pub fn encrypt_block(&self, block: &mut [u8]) -> Result<(), CryptoError> {
        self.check_block(block)?;
        match self {
            Self::Blowfish(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Twofish(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
        Ok(())
    }

    /// Decrypt exactly one block in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Cipher`] if `block` is not one block long.
    pub fn decrypt_block(&self, block: &mut [u8]) -> Result<(), CryptoError> {
        self.check_block(block)?;
        match self {
            Self::Blowfish(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Twofish(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
        Ok(())
    }

    fn check_block(&self, block: &[u8]) -> Result<(), CryptoError> {
        if block.len() == self.block_len() {
            Ok(())
        } else {
            Err(CryptoError::Cipher(format!(
                "{:?} block must be {} bytes, got {}",
                self.kind(),
                self.block_len(),
                block.len()
            )))
        }
    }
}

impl std::fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockCipher({:?}, ***)", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Schneier's published Blowfish vector: key 0x0000000000000000,
    // plaintext 0x0000000000000000.
    #[test]
    fn blowfish_known_answer_zero_key() {
        let cipher = BlockCipher::new(CipherKind::Blowfish, &[0u8; 8]).unwrap();
        let mut block = [0u8; 8];
        cipher.encrypt_block(&mut block).unwrap();
        assert_eq!(block, [0x4E, 0xF9, 0x97, 0x45, 0x61, 0x98, 0xDD, 0x78]);
    }

    // Twofish reference vector, 256-bit all-zero key, all-zero plaintext.
    #[test]
    fn twofish_known_answer_zero_key() {
        let cipher = BlockCipher::new(CipherKind::Twofish, &[0u8; 32]).unwrap();
        let mut block = [0u8; 16];
        cipher.encrypt_block(&mut block).unwrap();
        assert_eq!(
            block,
            [
                0x57, 0xFF, 0x73, 0x9D, 0x4D, 0xC9, 0x2C, 0x1B, 0xD7, 0xFC, 0x01, 0x70, 0x0C, 0xC8,
                0x21, 0x6F
            ]
        );
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        for (kind, key) in [
            (CipherKind::Blowfish, vec![0x11u8; 20]),
            (CipherKind::Twofish, vec![0x22u8; 32]),
        ] {
            let cipher = BlockCipher::new(kind, &key).unwrap();
            let original: Vec<u8> = (0..kind.block_len()).map(|i| i as u8).collect();
            let mut block = original.clone();
            cipher.encrypt_block(&mut block).unwrap();
            assert_ne!(block, original);
            cipher.decrypt_block(&mut block).unwrap();
            assert_eq!(block, original);
        }
    }

    #[test]
    fn wrong_block_size_is_rejected() {
        let cipher = BlockCipher::new(CipherKind::Twofish, &[1u8; 32]).unwrap();
        let mut short = [0u8; 8];
        assert!(matches!(
            cipher.encrypt_block(&mut short),
            Err(CryptoError::Cipher(_))
        ));
    }

    #[test]
    fn key_lengths_are_enforced() {
        assert!(BlockCipher::new(CipherKind::Twofish, &[0u8; 16]).is_err());
        assert!(BlockCipher::new(CipherKind::Blowfish, &[0u8; 3]).is_err());
        assert!(BlockCipher::new(CipherKind::Blowfish, &[0u8; 57]).is_err());
        assert!(BlockCipher::new(CipherKind::Blowfish, &[0u8; 56]).is_ok());
    }

    #[test]
    fn debug_does_not_leak_schedule() {
        let cipher = BlockCipher::new(CipherKind::Blowfish, &[9u8; 20]).unwrap();
        assert_eq!(format!("{cipher:?}"), "BlockCipher(Blowfish, ***)");
    }
}
