#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for sidecar locks.

use std::fs;

use keysafe_db::lock::sidecar_path;
use keysafe_db::{is_locked, lock, lock_as, unlock, DbError, LockOutcome, SaveIdentity};
use tempfile::TempDir;

fn identity(user: &str, pid: u32) -> SaveIdentity {
    SaveIdentity {
        user: user.into(),
        host: "host".into(),
        pid,
    }
}

#[test]
fn lock_writes_holder_and_unlock_removes_it() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("vault.psafe3");

    let LockOutcome::Acquired(info) = lock_as(&db, &identity("alice", 100)).unwrap() else {
        panic!("expected to acquire the lock");
    };
    assert_eq!(info.sidecar, dir.path().join("vault.plk"));
    assert_eq!(info.holder, "alice@host:100");
    assert_eq!(fs::read_to_string(&info.sidecar).unwrap(), "alice@host:100");
    assert!(is_locked(&db));

    unlock(&db).unwrap();
    assert!(!is_locked(&db));
    unlock(&db).unwrap();
}

#[test]
fn second_lock_reports_holder_without_overwriting() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("vault.psafe3");

    lock_as(&db, &identity("alice", 100)).unwrap();
    let second = lock_as(&db, &identity("bob", 200)).unwrap();
    assert_eq!(second, LockOutcome::AlreadyLocked("alice@host:100".into()));
    assert_eq!(
        fs::read_to_string(sidecar_path(&db)).unwrap(),
        "alice@host:100"
    );

    let err = second.into_result().unwrap_err();
    assert!(matches!(err, DbError::AlreadyLocked { .. }));
}

#[test]
fn config_files_keep_their_extension() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("prefs.cfg");
    lock(&cfg).unwrap().into_result().unwrap();
    assert!(dir.path().join("prefs.cfg.plk").exists());
    unlock(&cfg).unwrap();
    assert!(!is_locked(&cfg));
}

#[test]
fn lock_in_missing_directory_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = lock(dir.path().join("nope/vault.psafe3")).unwrap_err();
    assert!(matches!(err, DbError::Io(_)));
}
