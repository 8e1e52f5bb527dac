#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Unknown record and header fields survive load/save cycles unchanged.

use std::path::Path;
use std::sync::Arc;

use keysafe_db::{
    Container, ContainerConfig, Field, FieldSet, FieldType, FileContext, FixedClock,
    FormatVersion, HeaderRecord, ReadOutcome, Record, SaveIdentity,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

const PASSPHRASE: &[u8] = b"unknown-fields";

fn test_ctx(seed: u64) -> FileContext {
    FileContext::new(
        Box::new(StdRng::seed_from_u64(seed)),
        Arc::new(FixedClock(1_650_000_000)),
        SaveIdentity {
            user: "u".into(),
            host: "h".into(),
            pid: 1,
        },
    )
}

fn fast_config() -> ContainerConfig {
    ContainerConfig {
        iterations: 2048,
        ..ContainerConfig::default()
    }
}

fn save(path: &Path, version: FormatVersion, header: HeaderRecord, records: &[Record]) {
    let mut c = Container::create(
        path,
        PASSPHRASE,
        version,
        header,
        test_ctx(3),
        &fast_config(),
    )
    .unwrap();
    for r in records {
        c.write_record(r).unwrap();
    }
    c.close().unwrap();
}

fn load(path: &Path) -> (HeaderRecord, Vec<Record>) {
    let mut c = Container::open(path, PASSPHRASE, None, test_ctx(4), &fast_config()).unwrap();
    let header = c.header().clone();
    let mut records = Vec::new();
    while let ReadOutcome::Record(r) = c.read_record().unwrap() {
        records.push(r);
    }
    (header, records)
}

fn opaque(tag: u16, bytes: &[u8]) -> Field {
    Field::new(FieldType(tag), bytes.to_vec())
}

fn wire_tags(record: &Record) -> Vec<u16> {
    record.wire_fields().iter().map(|f| f.tag.0).collect()
}

#[test]
fn record_unknown_fields_keep_bytes_and_position() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.psafe3");
    let second = dir.path().join("second.psafe3");

    let record = Record::from_wire(
        vec![
            opaque(0x60, &[0xde, 0xad, 0xbe, 0xef]),
            Field::new(FieldType::TITLE, "a-title"),
            opaque(0x61, &[0u8; 40]),
            Field::new(FieldType::PASSWORD, "b-password!?"),
            opaque(0xfe, b""),
        ],
        FieldSet::V3,
    );
    assert_eq!(record.unknown_fields().len(), 3);

    save(&first, FormatVersion::V3, HeaderRecord::default(), &[record.clone()]);
    let (_, loaded) = load(&first);
    assert_eq!(loaded, vec![record.clone()]);

    save(&second, FormatVersion::V3, HeaderRecord::default(), &loaded);
    let (_, reloaded) = load(&second);
    assert_eq!(wire_tags(&reloaded[0]), vec![0x60, 0x03, 0x61, 0x06, 0xfe]);
    let wire = reloaded[0].wire_fields();
    assert_eq!(wire[0].value, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(wire[2].value, vec![0u8; 40]);
    assert!(wire[4].value.is_empty());
}

#[test]
fn edited_record_keeps_unknown_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edit.psafe3");

    let mut record = Record::from_wire(
        vec![
            Field::new(FieldType::TITLE, "old"),
            opaque(0x70, b"keep me"),
        ],
        FieldSet::V3,
    );
    record.set_text(FieldType::TITLE, "new");
    record.set_text(FieldType::URL, "https://example.org");
    save(&path, FormatVersion::V3, HeaderRecord::default(), &[record]);

    let (_, loaded) = load(&path);
    let r = &loaded[0];
    assert_eq!(r.text(FieldType::TITLE), Some("new"));
    assert_eq!(r.text(FieldType::URL), Some("https://example.org"));
    assert_eq!(r.unknown_fields().len(), 1);
    assert_eq!(r.unknown_fields()[0].field.value, b"keep me".to_vec());
    assert_eq!(wire_tags(r), vec![0x03, 0x70, 0x0d]);
}

#[test]
fn header_unknown_fields_survive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("header.psafe3");
    let header = HeaderRecord {
        unknown_fields: vec![opaque(0x30, b"future header"), opaque(0x31, &[1, 2, 3])],
        ..HeaderRecord::default()
    };
    save(&path, FormatVersion::V3, header, &[]);

    let (loaded, _) = load(&path);
    assert_eq!(loaded.unknown_fields.len(), 2);
    assert_eq!(loaded.unknown_fields[0].tag, FieldType(0x30));
    assert_eq!(loaded.unknown_fields[0].value, b"future header".to_vec());
    assert_eq!(loaded.unknown_fields[1].value, vec![1, 2, 3]);

    let copy = dir.path().join("copy.psafe3");
    save(&copy, FormatVersion::V3, loaded.clone(), &[]);
    let (again, _) = load(&copy);
    assert_eq!(again.unknown_fields, loaded.unknown_fields);
    assert_eq!(again.file_uuid, loaded.file_uuid);
}

#[test]
fn v2_keeps_fields_it_does_not_know() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v2.dat");
    let record = Record::from_wire(
        vec![
            Field::new(FieldType::TITLE, "t"),
            opaque(0x42, b"opaque"),
            Field::new(FieldType::PASSWORD, "p"),
        ],
        FieldSet::V2,
    );
    save(&path, FormatVersion::V2, HeaderRecord::default(), &[record.clone()]);
    let (_, loaded) = load(&path);
    assert_eq!(loaded, vec![record]);
}
