#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the V1 and V2 legacy containers.

use std::path::Path;
use std::sync::Arc;

use keysafe_db::format::legacy::{split_v1_name, PREAMBLE_LEN};
use keysafe_db::header::tag;
use keysafe_db::{
    check_password, CheckStatus, Container, ContainerConfig, DbError, Field, FieldType,
    FileContext, FixedClock, FormatVersion, HeaderRecord, ReadOutcome, Record, SaveIdentity,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

const PASSPHRASE: &[u8] = b"legacy-pass";

fn test_ctx(seed: u64) -> FileContext {
    FileContext::new(
        Box::new(StdRng::seed_from_u64(seed)),
        Arc::new(FixedClock(1_000_000_000)),
        SaveIdentity {
            user: "old".into(),
            host: "box".into(),
            pid: 9,
        },
    )
}

fn entry(group: &str, title: &str, user: &str, password: &str, notes: &str) -> Record {
    let mut r = Record::new();
    r.set_text(FieldType::GROUP, group);
    r.set_text(FieldType::TITLE, title);
    r.set_text(FieldType::USER, user);
    r.set_text(FieldType::NOTES, notes);
    r.set_text(FieldType::PASSWORD, password);
    r
}

fn save(path: &Path, version: FormatVersion, header: HeaderRecord, records: &[Record]) {
    let mut c = Container::create(
        path,
        PASSPHRASE,
        version,
        header,
        test_ctx(5),
        &ContainerConfig::default(),
    )
    .unwrap();
    for r in records {
        c.write_record(r).unwrap();
    }
    c.close().unwrap();
}

fn load(path: &Path, version: Option<FormatVersion>) -> (HeaderRecord, Vec<Record>) {
    let mut c = Container::open(
        path,
        PASSPHRASE,
        version,
        test_ctx(6),
        &ContainerConfig::default(),
    )
    .unwrap();
    let header = c.header().clone();
    let mut out = Vec::new();
    while let ReadOutcome::Record(r) = c.read_record().unwrap() {
        out.push(r);
    }
    (header, out)
}

#[test]
fn v2_roundtrip_keeps_v2_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v2.dat");
    let records = vec![
        entry("mail", "inbox", "alice", "s3cret", "first"),
        entry("", "bank", "", "pin", ""),
    ];
    let header = HeaderRecord {
        preferences: "B 1 1 I 2 10".into(),
        ..HeaderRecord::default()
    };
    save(&path, FormatVersion::V2, header, &records);

    let (header, loaded) = load(&path, None);
    assert_eq!(header.major, 2);
    assert_eq!(header.preferences, "B 1 1 I 2 10");
    assert_eq!(header.iterations, 0);
    assert_eq!(loaded, records);
}

#[test]
fn v2_drops_fields_without_a_v2_tag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v2.dat");
    let mut r = entry("g", "t", "u", "p", "n");
    r.set_text(FieldType::URL, "https://example.org");
    save(&path, FormatVersion::V2, HeaderRecord::default(), &[r]);

    let (_, loaded) = load(&path, Some(FormatVersion::V2));
    assert_eq!(loaded[0].text(FieldType::URL), None);
    assert_eq!(loaded[0].text(FieldType::TITLE), Some("t"));
}

#[test]
fn v1_roundtrip_uses_positional_triples() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v1.dat");
    let records = vec![
        entry("mail", "inbox", "alice", "s3cret", "first"),
        entry("", "bank", "", "pin", "second"),
    ];
    save(&path, FormatVersion::V1, HeaderRecord::default(), &records);

    let (header, loaded) = load(&path, None);
    assert_eq!(header.major, 1);
    assert_eq!(loaded.len(), 2);

    let name = loaded[0].text(FieldType::NAME).unwrap();
    assert_eq!(split_v1_name(name), ("mail.inbox", Some("alice")));
    assert_eq!(loaded[0].text(FieldType::PASSWORD), Some("s3cret"));
    assert_eq!(loaded[0].text(FieldType::NOTES), Some("first"));
    assert_eq!(loaded[0].text(FieldType::TITLE), None);

    assert_eq!(loaded[1].text(FieldType::NAME), Some("bank"));
    assert_eq!(loaded[1].text(FieldType::NOTES), Some("second"));
}

#[test]
fn v1_resave_is_stable() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.dat");
    let second = dir.path().join("b.dat");
    save(
        &first,
        FormatVersion::V1,
        HeaderRecord::default(),
        &[entry("g", "t", "u", "p", "n")],
    );
    let (_, loaded) = load(&first, Some(FormatVersion::V1));
    save(&second, FormatVersion::V1, HeaderRecord::default(), &loaded);
    let (_, again) = load(&second, Some(FormatVersion::V1));
    assert_eq!(again, loaded);
}

#[test]
fn legacy_wrong_passphrase() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v2.dat");
    save(&path, FormatVersion::V2, HeaderRecord::default(), &[]);

    let err = Container::open(
        &path,
        b"legacy-pasS",
        None,
        test_ctx(6),
        &ContainerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DbError::WrongPassword));
    assert_eq!(
        check_password(&path, b"legacy-pasS", None),
        CheckStatus::WrongPassword
    );
}

#[test]
fn short_file_is_not_legacy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.dat");
    std::fs::write(&path, vec![0u8; PREAMBLE_LEN - 1]).unwrap();
    assert_eq!(
        check_password(&path, PASSPHRASE, None),
        CheckStatus::NotThisFormat
    );
}

#[test]
fn v1_with_no_records_probes_as_v1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.dat");
    save(&path, FormatVersion::V1, HeaderRecord::default(), &[]);
    assert_eq!(
        check_password(&path, PASSPHRASE, None),
        CheckStatus::Success {
            version: FormatVersion::V1
        }
    );
    let (_, loaded) = load(&path, None);
    assert!(loaded.is_empty());
}

#[test]
fn v2_preferences_that_are_not_utf8_survive_a_resave() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.dat");
    let second = dir.path().join("second.dat");
    let raw = vec![b'B', b' ', 0xFF, 0x80];

    let header = HeaderRecord {
        unknown_fields: vec![Field::new(tag::PREFERENCES, raw.clone())],
        ..HeaderRecord::default()
    };
    save(&first, FormatVersion::V2, header, &[]);

    let (loaded, _) = load(&first, None);
    assert_eq!(loaded.preferences, "");
    assert_eq!(loaded.unknown_fields.len(), 1);
    assert_eq!(loaded.unknown_fields[0].value, raw);

    save(&second, FormatVersion::V2, loaded, &[]);
    let (again, _) = load(&second, None);
    assert_eq!(again.unknown_fields[0].value, raw);
}
