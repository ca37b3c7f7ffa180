//! Collision-free file names for outputs and markers.
//!
//! A name is owned once a file has been created at that path with create-new
//! semantics. Existence checks only skip names that are obviously taken; the
//! create itself is what decides, so two processes sharing a directory can
//! never end up writing the same file.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::ContainerFormat;

pub const MAX_NAMING_ATTEMPTS: u32 = 1000;

pub const TEMP_SUFFIX: &str = ".temp";

/// Atomically create `path`. `Ok(false)` means someone else already owns it.
pub fn try_claim(path: &Path) -> io::Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err),
    }
}

/// In-progress variant of a final path: `movie.converted.mkv.temp`.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn with_file_name(path: &Path, name: String) -> PathBuf {
    path.with_file_name(name)
}

/// `movie.converted.mkv`, then `movie.converted.1.mkv`, ...
pub fn output_candidate(input: &Path, format: ContainerFormat, counter: u32) -> PathBuf {
    let stem = stem_of(input);
    let name = match counter {
        0 => format!("{}.converted.{}", stem, format.extension()),
        n => format!("{}.converted.{}.{}", stem, n, format.extension()),
    };
    with_file_name(input, name)
}

/// `movie.orig.mp4`, then `movie.orig.1.mp4`, ...
pub fn original_marker_candidate(input: &Path, counter: u32) -> PathBuf {
    let stem = stem_of(input);
    let ext = input
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let name = match counter {
        0 => format!("{}.orig{}", stem, ext),
        n => format!("{}.orig.{}{}", stem, n, ext),
    };
    with_file_name(input, name)
}

/// `movie.mp4.fail`, then `movie.mp4.fail_1`, ...
pub fn failure_marker_candidate(input: &Path, counter: u32) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match counter {
        0 => format!("{}.fail", file_name),
        n => format!("{}.fail_{}", file_name, n),
    };
    with_file_name(input, name)
}

fn looks_taken(candidate: &Path) -> bool {
    candidate.exists() || temp_path_for(candidate).exists()
}

/// Claim the first free name produced by `candidate`, counting up from 0.
pub fn claim<F>(candidate: F) -> io::Result<PathBuf>
where
    F: Fn(u32) -> PathBuf,
{
    for counter in 0..MAX_NAMING_ATTEMPTS {
        let path = candidate(counter);
        if looks_taken(&path) {
            continue;
        }
        if try_claim(&path)? {
            debug!("Claimed {}", path.display());
            return Ok(path);
        }
        debug!("Lost race for {}, trying the next name", path.display());
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free name after {} attempts (last tried {})",
            MAX_NAMING_ATTEMPTS,
            candidate(MAX_NAMING_ATTEMPTS - 1).display()
        ),
    ))
}

/// Reserve the final output path for converting `input`.
pub fn claim_output_path(input: &Path, format: ContainerFormat) -> io::Result<PathBuf> {
    claim(|counter| output_candidate(input, format, counter))
}

/// Move `from` onto a freshly claimed name. The placeholder is given back if
/// the rename itself fails.
pub fn rename_into_slot<F>(from: &Path, candidate: F) -> io::Result<PathBuf>
where
    F: Fn(u32) -> PathBuf,
{
    let slot = claim(candidate)?;
    match fs::rename(from, &slot) {
        Ok(()) => Ok(slot),
        Err(err) => {
            release(&slot);
            Err(err)
        }
    }
}

/// Remove a claimed placeholder that never received any content.
pub fn release(path: &Path) {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => {
            if let Err(err) = fs::remove_file(path) {
                warn!("Could not release placeholder {}: {}", path.display(), err);
            }
        }
        Ok(_) => debug!("Not releasing {}: it has content", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not inspect placeholder {}: {}", path.display(), err),
    }
}
