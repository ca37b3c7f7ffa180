use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};

use crate::convert::ConversionReport;

/// Trait for reporting progress of scans, conversions and duplicate searches.
///
/// CLI implements with indicatif bars, a UI thread can use [`ChannelReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &Path) {}
    fn on_scan_progress(&self, _files_seen: usize, _current_path: &Path) {}
    fn on_scan_complete(&self, _candidates: usize, _duration_secs: f64) {}
    fn on_convert_start(&self, _index: usize, _total: usize, _path: &Path) {}
    fn on_encode_progress(&self, _percent: f32) {}
    fn on_convert_complete(&self, _report: &ConversionReport) {}
    fn on_fingerprint_start(&self, _total: usize) {}
    fn on_fingerprint_progress(&self, _done: usize, _total: usize) {}
    fn on_fingerprint_complete(&self, _hashed: usize, _duration_secs: f64) {}
    fn on_cluster_complete(&self, _groups: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ScanStarted(PathBuf),
    ScanProgress { files_seen: usize, current: PathBuf },
    ScanComplete { candidates: usize },
    ConvertStarted { index: usize, total: usize, path: PathBuf },
    EncodeProgress(f32),
    ConvertComplete(ConversionReport),
    FingerprintStarted { total: usize },
    FingerprintProgress { done: usize, total: usize },
    FingerprintComplete { hashed: usize },
    ClusterComplete { groups: usize },
}

/// Forwards every callback as a [`ProgressEvent`] so a display thread can drain
/// them from a queue while the work runs on a background thread.
pub struct ChannelReporter {
    sender: Sender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ProgressEvent) {
        // the receiving side may have gone away; the work continues regardless
        let _ = self.sender.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_scan_start(&self, root: &Path) {
        self.send(ProgressEvent::ScanStarted(root.to_path_buf()));
    }

    fn on_scan_progress(&self, files_seen: usize, current_path: &Path) {
        self.send(ProgressEvent::ScanProgress {
            files_seen,
            current: current_path.to_path_buf(),
        });
    }

    fn on_scan_complete(&self, candidates: usize, _duration_secs: f64) {
        self.send(ProgressEvent::ScanComplete { candidates });
    }

    fn on_convert_start(&self, index: usize, total: usize, path: &Path) {
        self.send(ProgressEvent::ConvertStarted {
            index,
            total,
            path: path.to_path_buf(),
        });
    }

    fn on_encode_progress(&self, percent: f32) {
        self.send(ProgressEvent::EncodeProgress(percent));
    }

    fn on_convert_complete(&self, report: &ConversionReport) {
        self.send(ProgressEvent::ConvertComplete(report.clone()));
    }

    fn on_fingerprint_start(&self, total: usize) {
        self.send(ProgressEvent::FingerprintStarted { total });
    }

    fn on_fingerprint_progress(&self, done: usize, total: usize) {
        self.send(ProgressEvent::FingerprintProgress { done, total });
    }

    fn on_fingerprint_complete(&self, hashed: usize, _duration_secs: f64) {
        self.send(ProgressEvent::FingerprintComplete { hashed });
    }

    fn on_cluster_complete(&self, groups: usize, _duration_secs: f64) {
        self.send(ProgressEvent::ClusterComplete { groups });
    }
}
