//! Tracing setup shared by the server and the ingest tool.
//!
//! Events go to stdout in compact form and, when the log file can be opened, to that file as
//! well. The file defaults to `logs/policy-assistant.log`; `POLICY_ASSISTANT_LOG_FILE` moves it.
//! File lines use the full format, so every event of one request carries its
//! `ask{request_id=...}` span prefix.
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "POLICY_ASSISTANT_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/policy-assistant.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` filters both outputs and defaults to `info`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Non-blocking writer for the log file, or `None` when it cannot be opened.
fn file_writer() -> Option<NonBlocking> {
    let path = log_file_path(std::env::var(LOG_FILE_ENV).ok());
    match open_log_file(&path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("File logging disabled, cannot open {}: {err}", path.display());
            None
        }
    }
}

fn log_file_path(override_path: Option<String>) -> PathBuf {
    override_path
        .filter(|path| !path.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from)
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
