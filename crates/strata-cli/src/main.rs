//! strata command-line tool.
//!
//! Inspects the configured filesystem sources and reads through them.
//!
//! Usage:
//!   strata sources
//!   strata resolve get mem1 a/b.txt
//!   strata ls mem1
//!   strata cat mem1 a/b.txt
//!
//! Logs go to stderr (`RUST_LOG` to tune); results go to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use strata_registry::{
    ConfigLoader, DriverTable, FilesystemManager, FilesystemService, GetContent, RequestKind,
};

/// Inspect and read strata filesystem sources.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Inspect and read strata filesystem sources")]
struct Args {
    /// Sources file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured filesystems
    Sources,
    /// Show how a request path resolves
    Resolve {
        /// Request kind (get, post, put, patch, delete, move, copy, transfer)
        #[arg(value_parser = RequestKind::from_str)]
        kind: RequestKind,
        key: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// List a directory
    Ls {
        key: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// Write a file's contents to stdout
    Cat { key: String, path: String },
}

#[derive(Serialize)]
struct Resolution<'a> {
    key: &'a str,
    protocol: &'a str,
    canonical_path: &'a str,
    path: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let loader = match args.config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::from_default_location().context("locating config")?,
    };
    tracing::debug!(config = %loader.path().display(), command = ?args.command, "starting");
    let manager = Arc::new(FilesystemManager::open(loader, DriverTable::default()).await);
    let service = FilesystemService::new(Arc::clone(&manager));

    match args.command {
        Command::Sources => {
            print_json(&manager.list_filesystems().await)?;
        }
        Command::Resolve { kind, key, path } => {
            let resolved = manager.validate(kind, &key, &path)?;
            print_json(&Resolution {
                key: &resolved.entry.name,
                protocol: &resolved.entry.protocol,
                canonical_path: &resolved.entry.canonical_path,
                path: &resolved.path,
            })?;
        }
        Command::Ls { key, path } => match service.get(&key, &path).await? {
            GetContent::Listing(listing) => print_json(&listing)?,
            GetContent::Bytes(_) => bail!("{key}:{path} is a file, not a directory"),
        },
        Command::Cat { key, path } => match service.get(&key, &path).await? {
            GetContent::Bytes(bytes) => {
                tracing::debug!(%key, %path, bytes = bytes.len(), "writing file to stdout");
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            GetContent::Listing(_) => bail!("{key}:{path} is a directory"),
        },
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
