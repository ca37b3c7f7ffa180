use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::tempdir;

use hevc_sweep::config::ContainerFormat;
use hevc_sweep::convert::naming;
use hevc_sweep::{FinalizationOutcome, OriginalDisposition, Probe, RejectReason};

/// Durations keyed by file name; anything else fails to probe.
struct Durations(HashMap<String, u64>);

impl Durations {
    fn new(entries: &[(&str, u64)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(name, secs)| (name.to_string(), *secs))
                .collect(),
        )
    }
}

impl Probe for Durations {
    fn codec(&self, _path: &Path) -> Option<String> {
        Some("h264".to_string())
    }

    fn duration_secs(&self, path: &Path) -> u64 {
        let name = path.file_name().unwrap().to_string_lossy();
        self.0.get(name.as_ref()).copied().unwrap_or(0)
    }
}

/// Set up `movie.mp4`, claim its output name and write the encoded temp file.
fn prepare(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let input = dir.join("movie.mp4");
    fs::write(&input, b"source").unwrap();
    let output = naming::claim_output_path(&input, ContainerFormat::Mkv).unwrap();
    let temp = naming::temp_path_for(&output);
    fs::write(&temp, b"encoded").unwrap();
    (input, temp, output)
}

#[test]
fn test_tolerance_boundary() {
    for (out_secs, accepted) in [(99, true), (100, true), (101, true), (102, false), (98, false)] {
        let tmp = tempdir().unwrap();
        let (input, temp, output) = prepare(tmp.path());
        let temp_name = temp.file_name().unwrap().to_string_lossy().into_owned();
        let probe = Durations::new(&[("movie.mp4", 100), (&temp_name, out_secs)]);

        let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);
        assert_eq!(outcome.is_accepted(), accepted, "out={}", out_secs);
    }
}

#[test]
fn test_collision_uses_next_counter() {
    let tmp = tempdir().unwrap();
    let existing = tmp.path().join("movie.converted.mkv");
    fs::write(&existing, b"someone else's file").unwrap();

    let (input, temp, output) = prepare(tmp.path());
    assert_eq!(output, tmp.path().join("movie.converted.1.mkv"));

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.1.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert!(outcome.is_accepted());
    assert_eq!(fs::read(&output).unwrap(), b"encoded");
    assert_eq!(fs::read(&existing).unwrap(), b"someone else's file");
}

#[test]
fn test_rejection_marks_original_with_counter() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("movie.mp4.fail"), b"earlier failure").unwrap();
    let (input, temp, output) = prepare(tmp.path());

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 50)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, true, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Rejected(RejectReason::DurationMismatch {
            source_secs: 100,
            output_secs: 50,
        })
    );
    assert_eq!(outcome_reason(&outcome), "duration mismatch: src=100 out=50");
    assert!(!input.exists());
    assert!(!temp.exists());
    assert_eq!(fs::read(tmp.path().join("movie.mp4.fail_1")).unwrap(), b"source");
    assert_eq!(fs::read(tmp.path().join("movie.mp4.fail")).unwrap(), b"earlier failure");
    assert_eq!(fs::read(&output).unwrap(), b"encoded");
}

fn outcome_reason(outcome: &FinalizationOutcome) -> String {
    match outcome {
        FinalizationOutcome::Rejected(reason) => reason.to_string(),
        FinalizationOutcome::Accepted { .. } => String::new(),
    }
}

#[test]
fn test_undeterminable_duration_leaves_input_alone() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());

    let probe = Durations::new(&[("movie.converted.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Rejected(RejectReason::DurationUndeterminable)
    );
    assert_eq!(fs::read(&input).unwrap(), b"source");
    assert!(!temp.exists());
    assert!(!output.exists());
}

#[test]
fn test_preserve_original_with_existing_marker() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("movie.orig.mp4"), b"older original").unwrap();
    let (input, temp, output) = prepare(tmp.path());

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 101)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, true, &probe);

    let marker = tmp.path().join("movie.orig.1.mp4");
    assert_eq!(
        outcome,
        FinalizationOutcome::Accepted {
            output: output.clone(),
            disposition: OriginalDisposition::RenamedToOriginalMarker(marker.clone()),
        }
    );
    assert!(!input.exists());
    assert_eq!(fs::read(marker).unwrap(), b"source");
}

#[test]
fn test_delete_original_leaves_no_trace() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Accepted {
            output: output.clone(),
            disposition: OriginalDisposition::Deleted,
        }
    );
    let mut remaining: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["movie.converted.mkv"]);
}

#[test]
fn test_concurrent_claims_never_collide() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("movie.mp4");
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let input = input.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                naming::claim_output_path(&input, ContainerFormat::Mp4).unwrap()
            })
        })
        .collect();

    let mut claimed: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), workers);
}

fn sorted_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_blocked_output_name_discards_temp_and_marks_source() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());
    // a non-empty directory squatting on the claimed name defeats the rename
    fs::remove_file(&output).unwrap();
    fs::create_dir(&output).unwrap();
    fs::write(output.join("keep"), b"x").unwrap();

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Rejected(RejectReason::OutputRenameFailed)
    );
    assert_eq!(
        sorted_listing(tmp.path()),
        vec!["movie.converted.mkv", "movie.mp4.fail"]
    );
    assert_eq!(fs::read(tmp.path().join("movie.mp4.fail")).unwrap(), b"source");
    assert!(output.join("keep").exists());
}

#[test]
fn test_marker_rename_failure_keeps_accepted_output() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());
    let elsewhere = tempdir().unwrap();
    let moved = elsewhere.path().join("movie.mp4");
    fs::rename(&input, &moved).unwrap();

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, true, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Accepted {
            output: output.clone(),
            disposition: OriginalDisposition::RenameFailed,
        }
    );
    assert_eq!(fs::read(&output).unwrap(), b"encoded");
    assert_eq!(fs::read(&moved).unwrap(), b"source");
    assert_eq!(sorted_listing(tmp.path()), vec!["movie.converted.mkv"]);
}

#[test]
fn test_delete_failure_is_reported() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());
    fs::remove_file(&input).unwrap();

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 100)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Accepted {
            output: output.clone(),
            disposition: OriginalDisposition::DeleteFailed,
        }
    );
    assert_eq!(fs::read(&output).unwrap(), b"encoded");
}

#[test]
fn test_rejection_survives_unmarkable_source() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());
    let elsewhere = tempdir().unwrap();
    fs::rename(&input, elsewhere.path().join("movie.mp4")).unwrap();

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 40)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert_eq!(
        outcome,
        FinalizationOutcome::Rejected(RejectReason::DurationMismatch {
            source_secs: 100,
            output_secs: 40,
        })
    );
    assert_eq!(fs::read(&output).unwrap(), b"encoded");
    assert_eq!(sorted_listing(tmp.path()), vec!["movie.converted.mkv"]);
}

#[test]
fn test_rejection_without_output_releases_placeholder() {
    let tmp = tempdir().unwrap();
    let (input, temp, output) = prepare(tmp.path());
    fs::remove_file(&temp).unwrap();

    let probe = Durations::new(&[("movie.mp4", 100), ("movie.converted.mkv.temp", 50)]);
    let outcome = hevc_sweep::convert::finalize(&input, &temp, &output, false, &probe);

    assert!(!outcome.is_accepted());
    assert!(!output.exists());
    assert_eq!(sorted_listing(tmp.path()), vec!["movie.mp4.fail"]);
}
