use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use hevc_sweep::{scan, CancelFlag, ChannelReporter, Error, Probe, ProgressEvent, Scanner};

/// Codecs keyed by file name. Unknown names probe as `h264`, names listed in
/// `broken` fail to probe.
#[derive(Default)]
struct FakeProbe {
    codecs: HashMap<String, String>,
    broken: Vec<String>,
}

impl FakeProbe {
    fn with_codec(mut self, name: &str, codec: &str) -> Self {
        self.codecs.insert(name.to_string(), codec.to_string());
        self
    }

    fn with_broken(mut self, name: &str) -> Self {
        self.broken.push(name.to_string());
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl Probe for FakeProbe {
    fn codec(&self, path: &Path) -> Option<String> {
        let name = file_name(path);
        if self.broken.contains(&name) {
            return None;
        }
        Some(
            self.codecs
                .get(&name)
                .cloned()
                .unwrap_or_else(|| "h264".to_string()),
        )
    }

    fn duration_secs(&self, _path: &Path) -> u64 {
        60
    }
}

fn write_sized(path: &Path, size: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0u8; size]).unwrap();
}

fn names(candidates: &[hevc_sweep::CandidateFile]) -> Vec<String> {
    candidates.iter().map(|c| file_name(&c.path)).collect()
}

/// Layout:
///   root/
///     big.mkv          (5000)
///     medium.mp4       (3000)
///     nested/
///       small.avi      (1500)
///       tiny.mov       (10)     below the threshold
///     notes.txt        (4000)   not a video
fn create_library(root: &Path) {
    write_sized(&root.join("big.mkv"), 5000);
    write_sized(&root.join("medium.mp4"), 3000);
    write_sized(&root.join("nested").join("small.avi"), 1500);
    write_sized(&root.join("nested").join("tiny.mov"), 10);
    write_sized(&root.join("notes.txt"), 4000);
}

#[test]
fn test_scan_orders_by_size_descending() {
    let tmp = tempdir().unwrap();
    create_library(tmp.path());

    let candidates = scan(tmp.path(), 1000, &FakeProbe::default()).unwrap();

    assert_eq!(names(&candidates), vec!["big.mkv", "medium.mp4", "small.avi"]);
    assert!(candidates.windows(2).all(|w| w[0].size >= w[1].size));
    assert_eq!(candidates[0].size, 5000);
    assert_eq!(candidates[0].codec.as_deref(), Some("h264"));
}

#[test]
fn test_scan_is_idempotent() {
    let tmp = tempdir().unwrap();
    create_library(tmp.path());
    write_sized(&tmp.path().join("twin_b.mp4"), 2000);
    write_sized(&tmp.path().join("twin_a.mp4"), 2000);

    let probe = FakeProbe::default();
    let first = scan(tmp.path(), 1000, &probe).unwrap();
    let second = scan(tmp.path(), 1000, &probe).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_equal_sizes_keep_enumeration_order() {
    let tmp = tempdir().unwrap();
    write_sized(&tmp.path().join("c.mp4"), 2000);
    write_sized(&tmp.path().join("a.mp4"), 2000);
    write_sized(&tmp.path().join("b.mp4"), 2000);

    let candidates = scan(tmp.path(), 0, &FakeProbe::default()).unwrap();
    assert_eq!(names(&candidates), vec!["a.mp4", "b.mp4", "c.mp4"]);
}

#[test]
fn test_marked_files_are_never_queued() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    for name in [
        "movie.mp4.fail",
        "movie.mp4.fail_1",
        "movie.mp4.fail_12",
        "movie.orig.mp4",
        "movie.orig.3.mkv",
        "show.fail_2.mkv",
    ] {
        write_sized(&root.join(name), 5000);
    }
    write_sized(&root.join("fresh.mp4"), 5000);

    let candidates = scan(root, 0, &FakeProbe::default()).unwrap();
    assert_eq!(names(&candidates), vec!["fresh.mp4"]);
}

#[test]
fn test_target_codec_is_skipped_and_probe_failure_kept() {
    let tmp = tempdir().unwrap();
    write_sized(&tmp.path().join("done.mkv"), 3000);
    write_sized(&tmp.path().join("mystery.mp4"), 2000);
    write_sized(&tmp.path().join("upper.MP4"), 1000);

    let probe = FakeProbe::default()
        .with_codec("done.mkv", "hevc")
        .with_broken("mystery.mp4")
        .with_codec("upper.MP4", "HEVC");

    let candidates = scan(tmp.path(), 0, &probe).unwrap();
    // codec comparison is exact, so "HEVC" is still a candidate
    assert_eq!(names(&candidates), vec!["mystery.mp4", "upper.MP4"]);
    assert_eq!(candidates[0].codec, None);
    assert_eq!(candidates[1].codec.as_deref(), Some("HEVC"));
}

#[test]
fn test_ignore_patterns_skip_directories() {
    let tmp = tempdir().unwrap();
    create_library(tmp.path());
    write_sized(&tmp.path().join("skip").join("huge.mkv"), 9000);

    let pattern = format!("{}/skip", tmp.path().display());
    let scanner = Scanner::new(1000).with_ignore_patterns(&[pattern, "[invalid".to_string()]);
    let candidates = scanner.scan(tmp.path(), &FakeProbe::default()).unwrap();

    assert_eq!(names(&candidates), vec!["big.mkv", "medium.mp4", "small.avi"]);
}

#[test]
fn test_custom_target_codec() {
    let tmp = tempdir().unwrap();
    write_sized(&tmp.path().join("a.mp4"), 100);
    write_sized(&tmp.path().join("b.mp4"), 100);

    let probe = FakeProbe::default().with_codec("a.mp4", "av1");
    let candidates = Scanner::new(0)
        .with_target_codec("av1")
        .scan(tmp.path(), &probe)
        .unwrap();
    assert_eq!(names(&candidates), vec!["b.mp4"]);
}

#[test]
fn test_missing_root_is_an_error() {
    let tmp = tempdir().unwrap();
    let missing: PathBuf = tmp.path().join("nope");
    let result = scan(&missing, 0, &FakeProbe::default());
    assert!(matches!(result, Err(Error::NotADirectory(p)) if p == missing));
}

#[test]
fn test_cancelled_scan_stops() {
    let tmp = tempdir().unwrap();
    create_library(tmp.path());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let (reporter, _events) = ChannelReporter::new();
    let result = Scanner::new(0).scan_with(tmp.path(), &FakeProbe::default(), &reporter, &cancel);
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_scan_reports_progress_over_channel() {
    let tmp = tempdir().unwrap();
    create_library(tmp.path());

    let (reporter, events) = ChannelReporter::new();
    let root = tmp.path().to_path_buf();
    let handle = std::thread::spawn(move || {
        Scanner::new(1000)
            .scan_with(&root, &FakeProbe::default(), &reporter, &CancelFlag::new())
            .map(|candidates| candidates.len())
    });
    let found = handle.join().unwrap().unwrap();
    let events: Vec<ProgressEvent> = events.try_iter().collect();

    assert_eq!(found, 3);
    assert_eq!(events.first(), Some(&ProgressEvent::ScanStarted(tmp.path().to_path_buf())));
    assert_eq!(events.last(), Some(&ProgressEvent::ScanComplete { candidates: 3 }));
    let progress_updates = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ScanProgress { .. }))
        .count();
    assert_eq!(progress_updates, 5);
}
