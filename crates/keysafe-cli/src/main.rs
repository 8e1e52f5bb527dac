//! `keysafe`: command-line tools for keysafe databases.
//!
//! Password checks, record listing, sidecar locks and the single-file
//! encryptor. Passphrases come from `--passphrase` or `KEYSAFE_PASSPHRASE`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use keysafe_db::FormatVersion;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

mod commands;

/// keysafe - inspect and maintain encrypted password databases
#[derive(Parser)]
#[command(name = "keysafe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Secret {
    /// Passphrase of the database or file
    #[arg(long, env = "KEYSAFE_PASSPHRASE", hide_env_values = true)]
    passphrase: String,
}

impl Secret {
    fn into_bytes(self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.passphrase.into_bytes())
    }
}

/// Container format selector.
#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    V1,
    V2,
    V3,
}

impl From<FormatArg> for FormatVersion {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::V1 => Self::V1,
            FormatArg::V2 => Self::V2,
            FormatArg::V3 => Self::V3,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Check a passphrase without decrypting any entry
    Check {
        /// Database file
        database: PathBuf,
        /// Expected format (probed when omitted)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[command(flatten)]
        secret: Secret,
    },

    /// List entry titles
    List {
        /// Database file
        database: PathBuf,
        /// Expected format (probed when omitted)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Directory holding keysafe.json
        #[arg(long)]
        config_dir: Option<PathBuf>,
        #[command(flatten)]
        secret: Secret,
    },

    /// Encrypt a file to FILE.PSF
    Encrypt {
        /// File to encrypt
        file: PathBuf,
        #[command(flatten)]
        secret: Secret,
    },

    /// Decrypt FILE.PSF back to FILE
    Decrypt {
        /// Encrypted file
        file: PathBuf,
        #[command(flatten)]
        secret: Secret,
    },

    /// Take the sidecar lock of a database
    Lock {
        /// Database file
        database: PathBuf,
    },

    /// Release the sidecar lock of a database
    Unlock {
        /// Database file
        database: PathBuf,
    },

    /// Show who holds the sidecar lock
    Status {
        /// Database file
        database: PathBuf,
    },

    /// Print the length and content digest of a file
    Signature {
        /// File to sign
        file: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Check {
            database,
            format,
            secret,
        } => commands::check(&database, &secret.into_bytes(), format.map(Into::into)),
        Command::List {
            database,
            format,
            config_dir,
            secret,
        } => commands::list(
            &database,
            &secret.into_bytes(),
            format.map(Into::into),
            config_dir.as_deref(),
        ),
        Command::Encrypt { file, secret } => commands::encrypt(&file, &secret.into_bytes()),
        Command::Decrypt { file, secret } => commands::decrypt(&file, &secret.into_bytes()),
        Command::Lock { database } => commands::lock(&database),
        Command::Unlock { database } => commands::unlock(&database),
        Command::Status { database } => commands::status(&database),
        Command::Signature { file } => commands::signature(&file),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
