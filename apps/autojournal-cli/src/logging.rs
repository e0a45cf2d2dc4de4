//! Logging initialization and log file management.
//!
//! Provides dual-output tracing: stderr (human-readable) and an optional
//! JSON log file at `<home>/logs/<slug>/<timestamp>.log`. File logging is
//! enabled for `run`; its slug may nest the run's window overrides
//! (`run/since-2-weeks-ago`), which cleanup walks like any other directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use autojournal_core::clock::format_utc_timestamp;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "warn";

/// Initialize the tracing subscriber with stderr output.
///
/// When `slug` is `Some`, an additional JSON file layer is added
/// that writes to `<home>/logs/<slug>/<timestamp>.log`.
///
/// Returns an optional [`WorkerGuard`] that must be held for the
/// lifetime of the program to ensure all buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the
/// log file cannot be opened.
pub fn init_tracing(home: &Path, slug: Option<&str>) -> Result<Option<WorkerGuard>> {
    if let Some((subscriber, guard)) = build_tracing(home, slug)? {
        subscriber.init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter())
            .init();
        Ok(None)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Build the tracing subscriber layers without registering globally.
///
/// Returns `Some((subscriber, guard))` when a slug is provided (dual-layer),
/// or `None` when only stderr logging is needed.
fn build_tracing(
    home: &Path,
    slug: Option<&str>,
) -> Result<Option<(impl tracing::Subscriber + Send + Sync, WorkerGuard)>> {
    let Some(slug) = slug else {
        return Ok(None);
    };

    let (non_blocking, guard) = open_log_writer(home, slug)?;

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("info")),
        );

    Ok(Some((subscriber, guard)))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
fn open_log_writer(
    home: &Path,
    slug: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(home, slug);

    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// Remove log files older than three days from `<home>/logs/`.
///
/// Best-effort: errors on individual files are reported with `eprintln!`
/// (tracing is not initialized yet) and never fail the command.
pub fn cleanup_old_logs(home: &Path) {
    let logs_dir = home.join("logs");
    if !logs_dir.is_dir() {
        return;
    }

    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    remove_old_log_files(&logs_dir, cutoff);
    remove_empty_dirs(&logs_dir);
}

/// Build the log file path: `<home>/logs/<slug>/<YYYYMMDD_HHMMSS>.log`.
fn build_log_path(home: &Path, slug: &str) -> PathBuf {
    let timestamp = format_utc_timestamp(SystemTime::now());
    home.join("logs").join(slug).join(format!("{timestamp}.log"))
}

/// Recursively remove `.log` files older than `cutoff` from `dir`.
fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "warning: failed to read log directory {}: {e}",
                dir.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(
                    "warning: failed to read metadata for {}: {e}",
                    path.display()
                );
                continue;
            }
        };

        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old log file {}: {e}",
                path.display(),
            );
        }
    }
}

/// Remove empty subdirectories under `dir` (does not remove `dir` itself).
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails when not empty.
            let _ = fs::remove_dir(&path);
        }
    }
}
