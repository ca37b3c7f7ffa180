//! Filename markers left behind by earlier runs.
//!
//! `.fail` / `.fail_<N>` mark originals whose conversion was rejected and
//! `.orig.` marks originals kept after a successful conversion. They are the
//! only durable state, so a rescan must never queue a marked file again.

use std::path::Path;

/// Extensions considered for conversion.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "mov", "avi"];

/// Extensions considered when looking for duplicates.
pub const DUPLICATE_SCAN_EXTENSIONS: [&str; 7] = ["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"];

pub const FAIL_MARKER: &str = ".fail";
pub const ORIGINAL_MARKER: &str = ".orig";

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, &VIDEO_EXTENSIONS)
}

/// `movie.mp4.fail`, `movie.mp4.fail_3`, ...
pub fn is_failure_marked(file_name: &str) -> bool {
    if file_name.ends_with(FAIL_MARKER) {
        return true;
    }
    file_name.match_indices(".fail_").any(|(idx, marker)| {
        file_name[idx + marker.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// `movie.orig.mp4`, `movie.orig.2.mp4`, ...
pub fn is_original_marked(file_name: &str) -> bool {
    file_name.contains(".orig.")
}

pub fn is_marked(file_name: &str) -> bool {
    is_failure_marked(file_name) || is_original_marked(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_markers() {
        assert!(is_failure_marked("movie.mp4.fail"));
        assert!(is_failure_marked("movie.mp4.fail_1"));
        assert!(is_failure_marked("movie.mp4.fail_12"));
        assert!(!is_failure_marked("movie.mp4"));
        assert!(!is_failure_marked("failure.mp4"));
        assert!(!is_failure_marked("movie.fail_safe.mp4"));
    }

    #[test]
    fn test_original_markers() {
        assert!(is_original_marked("movie.orig.mp4"));
        assert!(is_original_marked("movie.orig.3.mkv"));
        assert!(!is_original_marked("original.mp4"));
        assert!(!is_original_marked("movie.origami.mp4"));
    }

    #[test]
    fn test_video_extensions_case_insensitive() {
        assert!(is_video_file(Path::new("/videos/a.mp4")));
        assert!(is_video_file(Path::new("/videos/a.MKV")));
        assert!(is_video_file(Path::new("a.Mov")));
        assert!(!is_video_file(Path::new("a.webm")));
        assert!(!is_video_file(Path::new("a.mp4.fail")));
        assert!(!is_video_file(Path::new("README")));
        assert!(has_extension(Path::new("a.webm"), &DUPLICATE_SCAN_EXTENSIONS));
    }
}
