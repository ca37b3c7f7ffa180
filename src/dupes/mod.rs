pub mod cluster;
pub mod fingerprint;
pub mod phash;
pub mod report;
pub mod thumbnail;

pub use cluster::{cluster, hamming_distance, DuplicateGroup, MALFORMED_HASH_DISTANCE};
pub use fingerprint::{
    FfmpegFrameExtractor, Fingerprint, FingerprintClient, FrameExtractor, PerceptualHasher,
};
pub use phash::DctHasher;
