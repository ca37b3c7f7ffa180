use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tempfile::TempDir;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelFlag;
use crate::config::AppConfig;
use crate::convert::{
    ConversionAttempt, ConversionReport, ConversionStatus, EncodeStatus, Encoder, HandBrakeEncoder,
};
use crate::dupes::{
    cluster, thumbnail, DctHasher, DuplicateGroup, FfmpegFrameExtractor, Fingerprint,
    FingerprintClient, FrameExtractor, PerceptualHasher,
};
use crate::error::Error;
use crate::probe::{Ffprobe, Probe};
use crate::progress::ProgressReporter;
use crate::scanner::{markers, CandidateFile, Scanner};

/// Totals for one scan-and-convert pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub space_saved: i64,
    pub cancelled: bool,
    pub reports: Vec<ConversionReport>,
}

impl PassSummary {
    fn record(&mut self, report: ConversionReport) {
        match report.status {
            ConversionStatus::Converted { .. } => self.succeeded += 1,
            ConversionStatus::Rejected(_) | ConversionStatus::Failed(_) => self.failed += 1,
            ConversionStatus::Cancelled | ConversionStatus::DryRun => {}
        }
        self.space_saved += report.space_saved();
        self.reports.push(report);
    }
}

/// Scans a directory and converts its candidates one at a time.
pub struct ConvertEngine {
    config: AppConfig,
    probe: Arc<dyn Probe>,
    encoder: Box<dyn Encoder>,
}

impl ConvertEngine {
    pub fn new(config: AppConfig) -> Self {
        let probe: Arc<dyn Probe> = Arc::new(Ffprobe::new(&config.dependencies.ffprobe));
        let encoder: Box<dyn Encoder> =
            Box::new(HandBrakeEncoder::new(&config.dependencies.handbrake));
        Self {
            config,
            probe,
            encoder,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn directory(&self) -> Result<&Path, Error> {
        self.config
            .directory
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig(vec!["No directory specified".to_string()]))
    }

    /// Run passes until one finishes without `loop`, or until cancelled.
    /// `on_pass` sees every finished pass.
    pub fn run(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
        mut on_pass: impl FnMut(&PassSummary),
    ) -> Result<(), Error> {
        loop {
            let summary = self.run_pass(reporter, cancel)?;
            on_pass(&summary);

            if !self.config.run_loop || cancel.is_cancelled() {
                return Ok(());
            }

            info!(
                "Waiting {}s before the next pass",
                self.config.loop_interval_secs
            );
            for _ in 0..self.config.loop_interval_secs {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    /// Scan once and process every candidate, largest first.
    pub fn run_pass(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<PassSummary, Error> {
        let directory = self.directory()?;
        let candidates = match Scanner::from_config(&self.config).scan_with(
            directory,
            self.probe.as_ref(),
            reporter,
            cancel,
        ) {
            Ok(candidates) => candidates,
            Err(Error::Cancelled) => {
                return Ok(PassSummary {
                    cancelled: true,
                    ..PassSummary::default()
                })
            }
            Err(err) => return Err(err),
        };

        let mut summary = PassSummary {
            total: candidates.len(),
            ..PassSummary::default()
        };
        if candidates.is_empty() {
            info!("No files to convert in {}", directory.display());
            return Ok(summary);
        }

        let pass_start = Instant::now();
        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Stopping before {}", candidate.path.display());
                summary.cancelled = true;
                break;
            }

            reporter.on_convert_start(index, candidates.len(), &candidate.path);
            let report = self.process(candidate, reporter, cancel);
            reporter.on_convert_complete(&report);

            if report.status == ConversionStatus::Cancelled {
                summary.cancelled = true;
            }
            summary.record(report);
        }

        info!(
            "Pass finished in {:.2}s: {} converted, {} failed, {} bytes saved",
            pass_start.elapsed().as_secs_f64(),
            summary.succeeded,
            summary.failed,
            summary.space_saved
        );
        Ok(summary)
    }

    fn process(
        &self,
        candidate: &CandidateFile,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> ConversionReport {
        let report = |status, new_size| ConversionReport {
            path: candidate.path.clone(),
            original_size: candidate.size,
            new_size,
            status,
        };

        if self.config.dry_run {
            info!(
                "[dry run] Would convert {} ({} bytes, codec {})",
                candidate.path.display(),
                candidate.size,
                candidate.codec.as_deref().unwrap_or("unknown")
            );
            return report(ConversionStatus::DryRun, None);
        }

        let attempt = match ConversionAttempt::begin(&candidate.path, &self.config.output) {
            Ok(attempt) => attempt,
            Err(err) => {
                error!(
                    "Could not reserve an output name for {}: {}",
                    candidate.path.display(),
                    err
                );
                return report(ConversionStatus::Failed(err.to_string()), None);
            }
        };

        info!(
            "Converting {} -> {}",
            candidate.path.display(),
            attempt.final_output.display()
        );
        let encoded = self.encoder.encode(
            &attempt.input,
            &attempt.temp_output,
            &attempt.options,
            cancel,
            reporter,
        );

        match encoded {
            Ok(EncodeStatus::Completed) => {
                let outcome =
                    attempt.finalize(!self.config.remove_original_files, self.probe.as_ref());
                let status = ConversionStatus::from(outcome);
                let new_size = match &status {
                    ConversionStatus::Converted { output, .. } => {
                        fs::metadata(output).map(|meta| meta.len()).ok()
                    }
                    _ => None,
                };
                report(status, new_size)
            }
            Ok(EncodeStatus::Cancelled) => {
                warn!("Conversion of {} cancelled", candidate.path.display());
                attempt.abandon();
                report(ConversionStatus::Cancelled, None)
            }
            Err(err) => {
                error!("Error converting {}: {}", candidate.path.display(), err);
                attempt.abandon();
                report(ConversionStatus::Failed(err.to_string()), None)
            }
        }
    }
}

/// Groups found by a duplicate search. Thumbnails live until this is dropped
/// unless the engine was given its own thumbnail directory.
#[derive(Debug)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub videos_found: usize,
    pub fingerprinted: usize,
    thumbnail_dir: PathBuf,
    _workspace: Option<TempDir>,
}

impl DuplicateReport {
    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }
}

/// Finds visually similar videos under a directory.
pub struct DuplicateEngine {
    max_distance: u32,
    extractor: Arc<dyn FrameExtractor>,
    hasher: Arc<dyn PerceptualHasher>,
    thumbnail_dir: Option<PathBuf>,
    comparison: bool,
}

impl DuplicateEngine {
    pub fn new(config: &AppConfig) -> Self {
        let probe: Arc<dyn Probe> = Arc::new(Ffprobe::new(&config.dependencies.ffprobe));
        Self {
            max_distance: config.max_distance,
            extractor: Arc::new(FfmpegFrameExtractor::new(&config.dependencies.ffmpeg, probe)),
            hasher: Arc::new(DctHasher),
            thumbnail_dir: None,
            comparison: false,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FrameExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PerceptualHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_max_distance(mut self, max_distance: u32) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Keep frames in `dir` instead of a temporary directory.
    pub fn with_thumbnail_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.thumbnail_dir = Some(dir.into());
        self
    }

    /// Render a side-by-side image of the first two members of each group.
    pub fn with_comparison(mut self, comparison: bool) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn find_duplicates(
        &self,
        directory: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<DuplicateReport, Error> {
        if !directory.is_dir() {
            return Err(Error::NotADirectory(directory.to_path_buf()));
        }

        let videos = find_videos(directory, cancel)?;
        if videos.is_empty() {
            return Err(Error::NoVideosFound(directory.to_path_buf()));
        }
        info!("Found {} videos in {}", videos.len(), directory.display());

        let (thumbnail_dir, workspace) = match &self.thumbnail_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let workspace = tempfile::Builder::new().prefix("video_dup_").tempdir()?;
                (workspace.path().to_path_buf(), Some(workspace))
            }
        };

        let client = FingerprintClient::new(
            Arc::clone(&self.extractor),
            Arc::clone(&self.hasher),
            &thumbnail_dir,
        );
        let fingerprints = fingerprint_all(&client, &videos, reporter, cancel)?;
        if fingerprints.is_empty() {
            return Err(Error::NoFingerprints);
        }

        let cluster_start = Instant::now();
        let mut groups = cluster(&fingerprints, self.max_distance);
        if self.comparison {
            for (index, group) in groups.iter_mut().enumerate() {
                group.comparison = render_comparison(group, &thumbnail_dir, index);
            }
        }
        reporter.on_cluster_complete(groups.len(), cluster_start.elapsed().as_secs_f64());

        Ok(DuplicateReport {
            groups,
            videos_found: videos.len(),
            fingerprinted: fingerprints.len(),
            thumbnail_dir,
            _workspace: workspace,
        })
    }
}

fn find_videos(directory: &Path, cancel: &CancelFlag) -> Result<Vec<PathBuf>, Error> {
    let mut videos = Vec::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match entry {
            Ok(entry)
                if entry.file_type().is_file()
                    && markers::has_extension(entry.path(), &markers::DUPLICATE_SCAN_EXTENSIONS) =>
            {
                videos.push(entry.into_path())
            }
            Ok(_) => {}
            Err(err) => warn!("Skipping unreadable entry: {}", err),
        }
    }
    Ok(videos)
}

/// Fingerprint in parallel. Results keep the order of `videos`.
fn fingerprint_all(
    client: &FingerprintClient,
    videos: &[PathBuf],
    reporter: &dyn ProgressReporter,
    cancel: &CancelFlag,
) -> Result<Vec<Fingerprint>, Error> {
    let start = Instant::now();
    let total = videos.len();
    let done = AtomicUsize::new(0);
    reporter.on_fingerprint_start(total);

    let results: Vec<Option<Fingerprint>> = videos
        .par_iter()
        .enumerate()
        .map(|(index, video)| {
            if cancel.is_cancelled() {
                return None;
            }
            let result = client.fingerprint(video, index);
            reporter.on_fingerprint_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            match result {
                Ok(fingerprint) => Some(fingerprint),
                Err(err) => {
                    error!("Error processing {}: {}", video.display(), err);
                    None
                }
            }
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let fingerprints: Vec<Fingerprint> = results.into_iter().flatten().collect();
    let duration = start.elapsed().as_secs_f64();
    info!(
        "Fingerprinted {} of {} videos in {:.2}s",
        fingerprints.len(),
        total,
        duration
    );
    reporter.on_fingerprint_complete(fingerprints.len(), duration);
    Ok(fingerprints)
}

fn render_comparison(group: &DuplicateGroup, dir: &Path, index: usize) -> Option<PathBuf> {
    let (Some(Some(first)), Some(Some(second))) = (group.thumbnails.first(), group.thumbnails.get(1))
    else {
        return None;
    };
    let dest = dir.join(format!("comparison_{}.jpg", index + 1));
    match thumbnail::create_comparison(first, second, &dest) {
        Ok(path) => Some(path),
        Err(err) => {
            error!("Failed to create comparison thumbnail: {}", err);
            None
        }
    }
}
