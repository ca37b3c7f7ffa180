use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{command_failed, run_command_with_timeout};
use crate::error::Error;
use crate::probe::Probe;

/// Limit for a single frame grab.
pub const FRAME_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Perceptual identity of one video. Lives only for one duplicate search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub path: PathBuf,
    pub hash: String,
    /// Extracted frame; owned by whoever owns the thumbnail directory.
    pub thumbnail: Option<PathBuf>,
}

/// Pulls one representative still out of a video.
pub trait FrameExtractor: Send + Sync {
    /// Write a frame of `video` to `dest` and return the written path.
    fn extract_frame(&self, video: &Path, dest: &Path) -> Result<PathBuf, Error>;
}

pub trait PerceptualHasher: Send + Sync {
    /// Hex-encoded perceptual hash of the image at `image`.
    fn hash_image(&self, image: &Path) -> Result<String, Error>;
}

/// Grabs the middle frame with `ffmpeg`, locating it with a [`Probe`].
pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    probe: Arc<dyn Probe>,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>, probe: Arc<dyn Probe>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            probe,
        }
    }
}

impl FfmpegFrameExtractor {
    /// Seek position halfway through `video`, keeping sub-second precision.
    fn midpoint(&self, video: &Path) -> Result<f64, Error> {
        let duration = self.probe.duration(video);
        if duration.is_nan() || duration <= 0.0 {
            warn!("Could not determine duration for {}", video.display());
            return Err(Error::FrameExtraction(video.to_path_buf()));
        }
        Ok(duration / 2.0)
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn extract_frame(&self, video: &Path, dest: &Path) -> Result<PathBuf, Error> {
        let midpoint = self.midpoint(video)?;

        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-ss")
            .arg(midpoint.to_string())
            .arg("-i")
            .arg(video)
            .args(["-vframes", "1", "-q:v", "2", "-f", "image2"])
            .arg(dest)
            .arg("-y");

        let output = run_command_with_timeout(&mut command, FRAME_EXTRACTION_TIMEOUT)?;
        if !output.status.success() {
            return Err(command_failed(&self.ffmpeg, output.status, &output.stderr));
        }

        match fs::metadata(dest) {
            Ok(meta) if meta.len() > 0 => Ok(dest.to_path_buf()),
            Ok(_) => {
                warn!("Failed to extract frame from {}", video.display());
                let _ = fs::remove_file(dest);
                Err(Error::FrameExtraction(video.to_path_buf()))
            }
            Err(_) => {
                warn!("Failed to extract frame from {}", video.display());
                Err(Error::FrameExtraction(video.to_path_buf()))
            }
        }
    }
}

/// Combines an extractor and a hasher into [`Fingerprint`]s, keeping frames
/// in `thumbnail_dir`.
pub struct FingerprintClient {
    extractor: Arc<dyn FrameExtractor>,
    hasher: Arc<dyn PerceptualHasher>,
    thumbnail_dir: PathBuf,
}

impl FingerprintClient {
    pub fn new(
        extractor: Arc<dyn FrameExtractor>,
        hasher: Arc<dyn PerceptualHasher>,
        thumbnail_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            hasher,
            thumbnail_dir: thumbnail_dir.into(),
        }
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    /// `index` keeps frame names unique when two videos share a stem.
    pub fn fingerprint(&self, video: &Path, index: usize) -> Result<Fingerprint, Error> {
        let dest = self.thumbnail_path(video, index);
        let frame = self.extractor.extract_frame(video, &dest)?;
        let hash = self.hasher.hash_image(&frame)?;
        debug!("{} -> {}", video.display(), hash);
        Ok(Fingerprint {
            path: video.to_path_buf(),
            hash,
            thumbnail: Some(frame),
        })
    }

    fn thumbnail_path(&self, video: &Path, index: usize) -> PathBuf {
        let stem = video
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        self.thumbnail_dir.join(format!("{}_{}.jpg", stem, index))
    }
}
