//! Fuzz target for the single-file decryptor.
//!
//! The first byte picks the passphrase length; the rest is the sealed blob.
//!
//! ```sh
//! cd crates/keysafe-db
//! cargo +nightly fuzz run unseal -- -max_len=8192
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&n, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(n).min(rest.len());
    let (passphrase, sealed) = rest.split_at(split);
    let _ = keysafe_db::unseal(sealed, passphrase);
});
