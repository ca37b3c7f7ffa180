//! Decide whether an encoded file replaces its source.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::naming;
use crate::probe::Probe;

/// Largest accepted difference between source and output duration.
pub const DURATION_TOLERANCE_SECS: u64 = 1;

/// What happened to the source file after an accepted conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalDisposition {
    Deleted,
    /// Deletion failed; the source is still at its original name.
    DeleteFailed,
    RenamedToOriginalMarker(PathBuf),
    /// Renaming to the marker failed; the source is still at its original name.
    RenameFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    DurationUndeterminable,
    DurationMismatch { source_secs: u64, output_secs: u64 },
    /// The validated output could not be moved to its final name.
    OutputRenameFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DurationUndeterminable => write!(f, "duration undeterminable"),
            Self::DurationMismatch {
                source_secs,
                output_secs,
            } => write!(f, "duration mismatch: src={} out={}", source_secs, output_secs),
            Self::OutputRenameFailed => write!(f, "output rename failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationOutcome {
    Accepted {
        output: PathBuf,
        disposition: OriginalDisposition,
    },
    Rejected(RejectReason),
}

impl FinalizationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

enum Step {
    Pending,
    Validating { source_secs: u64, output_secs: u64 },
    Done(FinalizationOutcome),
}

/// Validate `temp_output` against `input` and settle both files.
///
/// `final_output` must already be claimed (see [`naming::claim_output_path`]).
/// Nothing here is retried and no error escapes: bookkeeping failures are
/// logged and reflected in the outcome.
pub fn finalize(
    input: &Path,
    temp_output: &Path,
    final_output: &Path,
    preserve_original: bool,
    probe: &dyn Probe,
) -> FinalizationOutcome {
    let mut step = Step::Pending;
    loop {
        step = match step {
            Step::Pending => {
                let source_secs = probe.duration_secs(input);
                let output_secs = probe.duration_secs(temp_output);
                if source_secs == 0 || output_secs == 0 {
                    error!(
                        "Could not determine durations for {} (src={}, out={})",
                        input.display(),
                        source_secs,
                        output_secs
                    );
                    discard_output(temp_output, final_output);
                    Step::Done(FinalizationOutcome::Rejected(
                        RejectReason::DurationUndeterminable,
                    ))
                } else {
                    Step::Validating {
                        source_secs,
                        output_secs,
                    }
                }
            }
            Step::Validating {
                source_secs,
                output_secs,
            } => {
                if source_secs.abs_diff(output_secs) <= DURATION_TOLERANCE_SECS {
                    Step::Done(accept(input, temp_output, final_output, preserve_original))
                } else {
                    Step::Done(reject(input, temp_output, final_output, source_secs, output_secs))
                }
            }
            Step::Done(outcome) => return outcome,
        }
    }
}

fn discard_output(temp_output: &Path, final_output: &Path) {
    match fs::remove_file(temp_output) {
        Ok(()) => info!("Removed temp output {}", temp_output.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => error!("Could not remove {}: {}", temp_output.display(), err),
    }
    naming::release(final_output);
}

fn accept(
    input: &Path,
    temp_output: &Path,
    final_output: &Path,
    preserve_original: bool,
) -> FinalizationOutcome {
    if let Err(err) = fs::rename(temp_output, final_output) {
        error!(
            "Could not move {} to {}: {}",
            temp_output.display(),
            final_output.display(),
            err
        );
        discard_output(temp_output, final_output);
        mark_failed(input);
        return FinalizationOutcome::Rejected(RejectReason::OutputRenameFailed);
    }
    info!("Conversion accepted: {}", final_output.display());

    let disposition = if preserve_original {
        match naming::rename_into_slot(input, |n| naming::original_marker_candidate(input, n)) {
            Ok(marked) => {
                info!("Kept original as {}", marked.display());
                OriginalDisposition::RenamedToOriginalMarker(marked)
            }
            Err(err) => {
                error!(
                    "Could not rename original {}: {}; leaving it in place",
                    input.display(),
                    err
                );
                OriginalDisposition::RenameFailed
            }
        }
    } else {
        match fs::remove_file(input) {
            Ok(()) => {
                info!("Deleted original {}", input.display());
                OriginalDisposition::Deleted
            }
            Err(err) => {
                error!("Could not delete original {}: {}", input.display(), err);
                OriginalDisposition::DeleteFailed
            }
        }
    };

    FinalizationOutcome::Accepted {
        output: final_output.to_path_buf(),
        disposition,
    }
}

fn reject(
    input: &Path,
    temp_output: &Path,
    final_output: &Path,
    source_secs: u64,
    output_secs: u64,
) -> FinalizationOutcome {
    warn!(
        "Duration mismatch for {}: src={}s out={}s",
        input.display(),
        source_secs,
        output_secs
    );

    // the suspect output stays on disk next to the marked source for inspection
    if let Err(err) = fs::rename(temp_output, final_output) {
        error!(
            "Could not move rejected output {} to {}: {}",
            temp_output.display(),
            final_output.display(),
            err
        );
        naming::release(final_output);
    }

    mark_failed(input);

    FinalizationOutcome::Rejected(RejectReason::DurationMismatch {
        source_secs,
        output_secs,
    })
}

/// Rename `input` to a `.fail` marker so later scans skip it.
fn mark_failed(input: &Path) {
    match naming::rename_into_slot(input, |n| naming::failure_marker_candidate(input, n)) {
        Ok(marked) => warn!("Marked failed original as {}", marked.display()),
        Err(err) => error!(
            "Could not mark failed original {}: {:?}",
            input.display(),
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct Durations(HashMap<PathBuf, u64>);

    impl Probe for Durations {
        fn codec(&self, _path: &Path) -> Option<String> {
            None
        }

        fn duration_secs(&self, path: &Path) -> u64 {
            self.0.get(path).copied().unwrap_or(0)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        input: PathBuf,
        temp: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let input = dir.path().join("movie.mp4");
        fs::write(&input, b"source").unwrap();
        let output = naming::claim_output_path(&input, crate::config::ContainerFormat::Mkv).unwrap();
        let temp = naming::temp_path_for(&output);
        fs::write(&temp, b"encoded").unwrap();
        Fixture {
            _dir: dir,
            input,
            temp,
            output,
        }
    }

    fn probe(f: &Fixture, source: u64, output: u64) -> Durations {
        Durations(HashMap::from([
            (f.input.clone(), source),
            (f.temp.clone(), output),
        ]))
    }

    #[test]
    fn test_one_second_difference_is_accepted() {
        let f = fixture();
        let outcome = finalize(&f.input, &f.temp, &f.output, false, &probe(&f, 100, 101));
        assert_eq!(
            outcome,
            FinalizationOutcome::Accepted {
                output: f.output.clone(),
                disposition: OriginalDisposition::Deleted,
            }
        );
        assert!(!f.input.exists());
        assert!(!f.temp.exists());
        assert_eq!(fs::read(&f.output).unwrap(), b"encoded");
    }

    #[test]
    fn test_two_second_difference_is_rejected() {
        let f = fixture();
        let outcome = finalize(&f.input, &f.temp, &f.output, false, &probe(&f, 100, 102));
        assert_eq!(
            outcome,
            FinalizationOutcome::Rejected(RejectReason::DurationMismatch {
                source_secs: 100,
                output_secs: 102,
            })
        );
        assert!(!f.input.exists());
        assert_eq!(fs::read(f.input.with_file_name("movie.mp4.fail")).unwrap(), b"source");
        assert_eq!(fs::read(&f.output).unwrap(), b"encoded");
    }

    #[test]
    fn test_zero_duration_discards_output() {
        let f = fixture();
        let outcome = finalize(&f.input, &f.temp, &f.output, false, &probe(&f, 100, 0));
        assert_eq!(
            outcome,
            FinalizationOutcome::Rejected(RejectReason::DurationUndeterminable)
        );
        assert!(!f.temp.exists());
        assert!(!f.output.exists());
        assert_eq!(fs::read(&f.input).unwrap(), b"source");
    }

    #[test]
    fn test_preserve_original_renames_source() {
        let f = fixture();
        let outcome = finalize(&f.input, &f.temp, &f.output, true, &probe(&f, 60, 60));
        let marker = f.input.with_file_name("movie.orig.mp4");
        assert_eq!(
            outcome,
            FinalizationOutcome::Accepted {
                output: f.output.clone(),
                disposition: OriginalDisposition::RenamedToOriginalMarker(marker.clone()),
            }
        );
        assert!(!f.input.exists());
        assert_eq!(fs::read(marker).unwrap(), b"source");
    }

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(
            RejectReason::DurationUndeterminable.to_string(),
            "duration undeterminable"
        );
        assert_eq!(
            RejectReason::DurationMismatch {
                source_secs: 100,
                output_secs: 102
            }
            .to_string(),
            "duration mismatch: src=100 out=102"
        );
    }
}
