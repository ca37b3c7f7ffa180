use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::error;

use crate::command::run_command;

/// Read-only media queries. Failures are folded into the return value
/// (`None` codec, zero duration) so callers never have to unwind a probe error.
pub trait Probe: Send + Sync {
    /// Codec name of the first video stream, e.g. `"h264"` or `"hevc"`.
    fn codec(&self, path: &Path) -> Option<String>;

    /// Container duration in whole seconds (truncated). 0 on failure.
    fn duration_secs(&self, path: &Path) -> u64;

    /// Container duration with its fractional part. 0.0 on failure.
    fn duration(&self, path: &Path) -> f64 {
        self.duration_secs(path) as f64
    }
}

/// [`Probe`] backed by the `ffprobe` command line tool.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: PathBuf,
}

impl Ffprobe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn query(&self, path: &Path, entries: &str) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
            .arg(entries)
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        match run_command(&mut command) {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                error!(
                    "ffprobe failed for {} with {}",
                    path.display(),
                    output.status
                );
                None
            }
            Err(err) => {
                error!("Error running ffprobe for {}: {}", path.display(), err);
                None
            }
        }
    }
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Probe for Ffprobe {
    fn codec(&self, path: &Path) -> Option<String> {
        self.query(path, "stream=codec_name")
            .and_then(|stdout| parse_codec_output(&stdout))
    }

    fn duration_secs(&self, path: &Path) -> u64 {
        self.duration(path).trunc() as u64
    }

    fn duration(&self, path: &Path) -> f64 {
        let Some(stdout) = self.query(path, "format=duration") else {
            return 0.0;
        };
        match parse_duration_seconds(&stdout) {
            Some(secs) => secs,
            None => {
                error!(
                    "Could not parse duration for {}: {:?}",
                    path.display(),
                    stdout.trim()
                );
                0.0
            }
        }
    }
}

pub fn parse_codec_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Parse ffprobe's `format=duration` value. `None` unless positive and finite.
pub fn parse_duration_seconds(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

/// Parse ffprobe's `format=duration` value, truncating to whole seconds.
pub fn parse_duration_output(stdout: &str) -> u64 {
    parse_duration_seconds(stdout)
        .map(|secs| secs.trunc() as u64)
        .unwrap_or(0)
}
