//! Fuzz target for the password-history parser.
//!
//! Feeds arbitrary strings to `PasswordHistory::parse` and re-encodes the
//! result. Must never panic.
//!
//! # Usage
//!
//! ```sh
//! cargo +nightly install cargo-fuzz
//! cd crates/keysafe-db
//! cargo +nightly fuzz run history_parse -- -max_len=4096
//! ```

#![no_main]

use keysafe_db::PasswordHistory;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let (history, _) = PasswordHistory::parse(s);
        let _ = history.serialize();
    }
});
