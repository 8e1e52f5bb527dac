//! CLI command implementations.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use keysafe_db::format::legacy::split_v1_name;
use keysafe_db::{
    check_password, CheckStatus, Container, ContainerConfig, FieldType, FileContext,
    FileSignature, FormatVersion, LockOutcome, ReadOutcome, Record,
};

/// Exit code for a passphrase that does not match.
const EXIT_WRONG_PASSWORD: u8 = 2;
/// Exit code for a file in another format.
const EXIT_NOT_THIS_FORMAT: u8 = 3;
/// Exit code for an unreadable file.
const EXIT_CANT_OPEN: u8 = 4;
/// Exit code when a lock is held by someone else.
const EXIT_LOCKED: u8 = 5;

pub fn check(
    database: &Path,
    passphrase: &[u8],
    format: Option<FormatVersion>,
) -> Result<ExitCode> {
    let code = match check_password(database, passphrase, format) {
        CheckStatus::Success { version } => {
            println!("ok ({version})");
            return Ok(ExitCode::SUCCESS);
        }
        CheckStatus::WrongPassword => {
            println!("wrong passphrase");
            EXIT_WRONG_PASSWORD
        }
        CheckStatus::NotThisFormat => {
            println!("not a keysafe database of the requested format");
            EXIT_NOT_THIS_FORMAT
        }
        CheckStatus::CantOpenFile => {
            println!("cannot open {}", database.display());
            EXIT_CANT_OPEN
        }
    };
    Ok(ExitCode::from(code))
}

pub fn list(
    database: &Path,
    passphrase: &[u8],
    format: Option<FormatVersion>,
    config_dir: Option<&Path>,
) -> Result<ExitCode> {
    let config = config_dir.map_or_else(ContainerConfig::default, ContainerConfig::load);
    let mut container =
        Container::open(database, passphrase, format, FileContext::system(), &config)
            .with_context(|| format!("opening {}", database.display()))?;

    let version = container.version();
    let header = container.header();
    if !header.db_name.is_empty() {
        println!("# {}", header.db_name);
    }
    let mut count = 0usize;
    while let ReadOutcome::Record(record) = container.read_record()? {
        println!("{}", display_name(&record, version));
        count = count.saturating_add(1);
    }
    container.close()?;
    tracing::debug!(count, %version, "listed records");
    Ok(ExitCode::SUCCESS)
}

/// One-line label for `record`: `group/title [user]`. Never shows secrets.
fn display_name(record: &Record, version: FormatVersion) -> String {
    if version == FormatVersion::V1 {
        let name = record.text(FieldType::NAME).unwrap_or_default();
        return match split_v1_name(name) {
            (title, Some(user)) if !user.is_empty() => format!("{title} [{user}]"),
            (title, _) => title.to_owned(),
        };
    }
    let title = record.text(FieldType::TITLE).unwrap_or("(untitled)");
    let mut line = match record.text(FieldType::GROUP) {
        Some(group) if !group.is_empty() => format!("{group}/{title}"),
        _ => title.to_owned(),
    };
    if let Some(user) = record.text(FieldType::USER).filter(|u| !u.is_empty()) {
        line.push_str(" [");
        line.push_str(user);
        line.push(']');
    }
    line
}

pub fn encrypt(file: &Path, passphrase: &[u8]) -> Result<ExitCode> {
    let mut ctx = keysafe_db::FileContext::system();
    let out = keysafe_db::encrypt_file(file, passphrase, ctx.rng.as_mut())
        .with_context(|| format!("encrypting {}", file.display()))?;
    println!("{}", out.display());
    Ok(ExitCode::SUCCESS)
}

pub fn decrypt(file: &Path, passphrase: &[u8]) -> Result<ExitCode> {
    let out = keysafe_db::decrypt_file(file, passphrase)
        .with_context(|| format!("decrypting {}", file.display()))?;
    println!("{}", out.display());
    Ok(ExitCode::SUCCESS)
}

pub fn lock(database: &Path) -> Result<ExitCode> {
    match keysafe_db::lock(database)? {
        LockOutcome::Acquired(info) => {
            println!("locked as {}", info.holder);
            Ok(ExitCode::SUCCESS)
        }
        LockOutcome::AlreadyLocked(holder) => {
            println!("already locked by {holder}");
            Ok(ExitCode::from(EXIT_LOCKED))
        }
    }
}

pub fn unlock(database: &Path) -> Result<ExitCode> {
    keysafe_db::unlock(database)?;
    Ok(ExitCode::SUCCESS)
}

pub fn status(database: &Path) -> Result<ExitCode> {
    let sidecar = keysafe_db::lock::sidecar_path(database);
    if keysafe_db::is_locked(database) {
        let holder = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("reading {}", sidecar.display()))?;
        println!("locked by {holder}");
    } else {
        println!("unlocked");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn signature(file: &Path) -> Result<ExitCode> {
    let sig = FileSignature::of(file)?;
    let digest: String = sig.digest.iter().map(|b| format!("{b:02x}")).collect();
    println!("{} {digest}", sig.length);
    Ok(ExitCode::SUCCESS)
}
