use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_FILE_NAME: &str = "convert_videos.log";

pub fn default_log_path() -> PathBuf {
    env::temp_dir().join(DEFAULT_LOG_FILE_NAME)
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Pick a writable log file: `requested`, else the temp directory default.
/// Notes about fallbacks are returned so they can be logged once tracing is up.
fn choose_log_file(requested: Option<&Path>) -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut notes = Vec::new();
    let default = default_log_path();

    if let Some(path) = requested {
        match open_log_file(path) {
            Ok(file) => return (Some((path.to_path_buf(), file)), notes),
            Err(err) => notes.push(format!(
                "Cannot write log file {}: {}; falling back to {}",
                path.display(),
                err,
                default.display()
            )),
        }
    }

    match open_log_file(&default) {
        Ok(file) => (Some((default, file)), notes),
        Err(err) => {
            notes.push(format!(
                "Cannot write log file {}: {}; logging to console only",
                default.display(),
                err
            ));
            (None, notes)
        }
    }
}

/// Install stdout and file logging. Keep the returned guard alive for the
/// lifetime of the program so buffered lines reach the file.
pub fn init_logger(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let (chosen, notes) = choose_log_file(log_file);
    let (file_layer, guard, path) = match chosen {
        Some((path, file)) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard), Some(path))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter_layer)
        .init();

    for note in notes {
        warn!("{}", note);
    }
    match path {
        Some(path) => info!("Logging to {}", path.display()),
        None => info!("Logging to console only"),
    }

    guard
}
