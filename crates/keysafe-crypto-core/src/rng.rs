//! Randomness source used for salts, IVs, padding and file identifiers.
//!
//! Callers hand a `&mut dyn SecureRng` down instead of reaching for a global
//! generator, so tests can substitute a seeded one.

use rand::{CryptoRng, RngCore};

/// A cryptographically secure generator that can cross thread boundaries.
pub trait SecureRng: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> SecureRng for T {}
