use std::path::{Path, PathBuf};
use std::time::Instant;

use ahash::AHashSet;
use serde::Serialize;
use tracing::{debug, info};

use super::fingerprint::Fingerprint;

/// Distance reported for a hash that is not valid hex. Larger than any
/// threshold worth configuring.
pub const MALFORMED_HASH_DISTANCE: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Hash of the member that seeded the group.
    pub hash: String,
    pub files: Vec<PathBuf>,
    pub max_distance: u32,
    /// Thumbnail of each member, aligned with `files`.
    pub thumbnails: Vec<Option<PathBuf>>,
    /// Side-by-side image of the first two members, when one was rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<PathBuf>,
}

fn hex_nibbles(hash: &str) -> Option<Vec<u8>> {
    let hash = hash.trim();
    let digits = hash
        .strip_prefix("0x")
        .or_else(|| hash.strip_prefix("0X"))
        .unwrap_or(hash);
    if digits.is_empty() {
        return None;
    }
    digits
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect()
}

/// Number of differing bits between two hex-encoded hashes, compared as
/// integers so hashes of different lengths still line up on the right.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    let (Some(a), Some(b)) = (hex_nibbles(a), hex_nibbles(b)) else {
        return MALFORMED_HASH_DISTANCE;
    };

    let width = a.len().max(b.len());
    let padded = |digits: &[u8], i: usize| -> u8 {
        let offset = width - digits.len();
        if i < offset {
            0
        } else {
            digits[i - offset]
        }
    };

    (0..width)
        .map(|i| (padded(&a, i) ^ padded(&b, i)).count_ones())
        .sum()
}

/// Greedy single-link grouping of fingerprints whose hashes lie within
/// `max_distance` of a group's first member.
///
/// A fingerprint that finds no match stays available to later groups, but
/// earlier fingerprints are never revisited, so grouping depends on input
/// order and is not fully transitive.
pub fn cluster(fingerprints: &[Fingerprint], max_distance: u32) -> Vec<DuplicateGroup> {
    let start = Instant::now();
    let mut processed: AHashSet<&Path> = AHashSet::new();
    let mut groups = Vec::new();

    for (i, seed) in fingerprints.iter().enumerate() {
        if processed.contains(seed.path.as_path()) {
            continue;
        }

        let mut files = vec![seed.path.clone()];
        let mut thumbnails = vec![seed.thumbnail.clone()];
        let mut group_max = 0;

        for other in &fingerprints[i + 1..] {
            if processed.contains(other.path.as_path()) {
                continue;
            }
            let distance = hamming_distance(&seed.hash, &other.hash);
            if distance <= max_distance {
                files.push(other.path.clone());
                thumbnails.push(other.thumbnail.clone());
                group_max = group_max.max(distance);
                processed.insert(other.path.as_path());
            }
        }

        if files.len() > 1 {
            debug!(
                "Group of {} around {} (max distance {})",
                files.len(),
                seed.path.display(),
                group_max
            );
            processed.insert(seed.path.as_path());
            groups.push(DuplicateGroup {
                hash: seed.hash.clone(),
                files,
                max_distance: group_max,
                thumbnails,
                comparison: None,
            });
        }
    }

    info!(
        "Clustered {} fingerprints into {} groups in {:.2}s",
        fingerprints.len(),
        groups.len(),
        start.elapsed().as_secs_f64()
    );
    groups
}
