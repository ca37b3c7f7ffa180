use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use colored::*;
use hevc_sweep::{ConversionReport, ConversionStatus, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan: spinner, the number of files is not known upfront
/// - Encode: percentage bar per file
/// - Fingerprint: bar over all videos
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_chars(TICK_CHARS));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn bar(len: u64, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        // a panic while holding the lock only leaves a stale bar behind
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn done(message: String) {
        eprintln!("  {} {}", "✓".green(), message);
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &Path) {
        self.set_bar(spinner(&format!("Scanning {}...", root.display())));
    }

    fn on_scan_progress(&self, files_seen: usize, _current_path: &Path) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_message(format!("Scanning... {} files seen", files_seen));
        }
    }

    fn on_scan_complete(&self, candidates: usize, duration_secs: f64) {
        self.finish_bar();
        Self::done(format!(
            "Scan complete: {} files to convert in {:.2}s",
            candidates, duration_secs
        ));
    }

    fn on_convert_start(&self, index: usize, total: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = bar(
            100,
            "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}% ({eta} remaining)",
        );
        pb.set_message(format!("[{}/{}] {}", index + 1, total, name));
        self.set_bar(pb);
    }

    fn on_encode_progress(&self, percent: f32) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_position(percent.clamp(0.0, 100.0) as u64);
        }
    }

    fn on_convert_complete(&self, report: &ConversionReport) {
        self.finish_bar();
        let name = report.path.display();
        match &report.status {
            ConversionStatus::Converted { output, .. } => Self::done(format!(
                "{} -> {}",
                name,
                output.display()
            )),
            ConversionStatus::Rejected(reason) => {
                eprintln!("  {} {}: {}", "✗".red(), name, reason)
            }
            ConversionStatus::Failed(err) => eprintln!("  {} {}: {}", "✗".red(), name, err),
            ConversionStatus::Cancelled => eprintln!("  {} {}: cancelled", "-".yellow(), name),
            ConversionStatus::DryRun => eprintln!("  {} {} (dry run)", "·".cyan(), name),
        }
    }

    fn on_fingerprint_start(&self, total: usize) {
        self.set_bar(bar(
            total as u64,
            "  {spinner:.cyan} Fingerprinting [{bar:30.cyan/dim}] {pos}/{len} videos ({eta} remaining)",
        ));
    }

    fn on_fingerprint_progress(&self, done: usize, total: usize) {
        if let Some(pb) = self.lock().as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }

    fn on_fingerprint_complete(&self, hashed: usize, duration_secs: f64) {
        self.finish_bar();
        Self::done(format!(
            "Fingerprinting complete: {} videos in {:.2}s",
            hashed, duration_secs
        ));
    }

    fn on_cluster_complete(&self, groups: usize, duration_secs: f64) {
        Self::done(format!(
            "Comparison complete: {} duplicate groups in {:.2}s",
            groups, duration_secs
        ));
    }
}
