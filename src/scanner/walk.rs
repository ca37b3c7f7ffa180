use glob::Pattern;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::markers;
use crate::cancel::CancelFlag;
use crate::config::AppConfig;
use crate::error::Error;
use crate::probe::Probe;
use crate::progress::{ProgressReporter, SilentReporter};

/// A file that should be converted. `codec` is `None` when probing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
    pub codec: Option<String>,
}

/// Decides which videos under a directory still need converting.
#[derive(Debug, Clone)]
pub struct Scanner {
    min_size_bytes: u64,
    target_codec: String,
    ignore_patterns: Vec<Pattern>,
}

impl Scanner {
    pub fn new(min_size_bytes: u64) -> Self {
        Self {
            min_size_bytes,
            target_codec: "hevc".to_string(),
            ignore_patterns: Vec::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.min_file_size)
            .with_target_codec(&config.target_codec)
            .with_ignore_patterns(&config.ignore_patterns)
    }

    pub fn with_target_codec(mut self, codec: &str) -> Self {
        self.target_codec = codec.to_string();
        self
    }

    /// Glob patterns matched against full paths. Invalid patterns are logged and dropped.
    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    pub fn scan(&self, root: &Path, probe: &dyn Probe) -> Result<Vec<CandidateFile>, Error> {
        self.scan_with(root, probe, &SilentReporter, &CancelFlag::new())
    }

    /// Walk `root` and return conversion candidates, largest first.
    ///
    /// Entries are visited in file-name order so that equal-sized files keep a
    /// stable relative order between runs. Problems with individual files are
    /// logged and the file is skipped.
    pub fn scan_with(
        &self,
        root: &Path,
        probe: &dyn Probe,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<Vec<CandidateFile>, Error> {
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        info!("Scanning directory: {}", root.display());
        reporter.on_scan_start(root);
        let start = Instant::now();

        let mut candidates = Vec::new();
        let mut files_seen = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry.path()));

        for entry_result in walker {
            if cancel.is_cancelled() {
                info!("Scan cancelled after {} files", files_seen);
                return Err(Error::Cancelled);
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            files_seen += 1;
            reporter.on_scan_progress(files_seen, entry.path());

            if let Some(candidate) = self.evaluate(&entry, probe) {
                candidates.push(candidate);
            }
        }

        // stable: equal sizes keep enumeration order
        candidates.sort_by(|a, b| b.size.cmp(&a.size));

        let duration = start.elapsed();
        info!(
            "Scan found {} candidates among {} files in {:.2}s",
            candidates.len(),
            files_seen,
            duration.as_secs_f64()
        );
        reporter.on_scan_complete(candidates.len(), duration.as_secs_f64());

        Ok(candidates)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn evaluate(&self, entry: &DirEntry, probe: &dyn Probe) -> Option<CandidateFile> {
        let path = entry.path();
        if !markers::is_video_file(path) {
            return None;
        }

        let file_name = entry.file_name().to_string_lossy();
        if markers::is_marked(&file_name) {
            debug!("Skipping already handled file: {}", path.display());
            return None;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                warn!("Error reading metadata for {}: {}", path.display(), err);
                return None;
            }
        };
        if size < self.min_size_bytes {
            return None;
        }

        let codec = probe.codec(path);
        match codec.as_deref() {
            Some(codec) if codec == self.target_codec => {
                debug!("Already {}: {}", codec, path.display());
                return None;
            }
            Some(_) => {}
            None => warn!(
                "Could not determine codec for {}, keeping it as a candidate",
                path.display()
            ),
        }

        Some(CandidateFile {
            path: path.to_path_buf(),
            size,
            codec,
        })
    }
}

/// Scan `root` with default settings apart from the size threshold.
pub fn scan(root: &Path, min_size_bytes: u64, probe: &dyn Probe) -> Result<Vec<CandidateFile>, Error> {
    Scanner::new(min_size_bytes).scan(root, probe)
}
