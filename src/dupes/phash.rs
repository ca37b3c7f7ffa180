use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use rustdct::DctPlanner;
use transpose::transpose_inplace;

use super::fingerprint::PerceptualHasher;
use crate::error::Error;

/// Side of the square the frame is shrunk to before the DCT.
const RESIZE_SIDE: usize = 32;

/// Side of the low-frequency block that becomes the hash (64 bits).
const HASH_SIDE: usize = 8;

/// DCT-based perceptual hash: 64 bits, encoded as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DctHasher;

impl DctHasher {
    pub fn hash(&self, image: &DynamicImage) -> String {
        let gray = image
            .resize_exact(RESIZE_SIDE as u32, RESIZE_SIDE as u32, FilterType::Lanczos3)
            .into_luma8();
        let mut coefficients: Vec<f64> = gray.as_raw().iter().map(|&p| f64::from(p)).collect();
        dct_2d(&mut coefficients, RESIZE_SIDE);

        let low: Vec<f64> = coefficients
            .chunks_exact(RESIZE_SIDE)
            .take(HASH_SIDE)
            .flat_map(|row| row[..HASH_SIDE].iter().copied())
            .collect();
        let median = median(&low);

        let bits = low
            .iter()
            .fold(0u64, |acc, &value| (acc << 1) | u64::from(value > median));
        format!("{:016x}", bits)
    }
}

impl PerceptualHasher for DctHasher {
    fn hash_image(&self, image: &Path) -> Result<String, Error> {
        let image = image::open(image)?;
        Ok(self.hash(&image))
    }
}

/// In-place 2-D DCT-II of a `side` x `side` row-major matrix.
fn dct_2d(values: &mut [f64], side: usize) {
    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(side);
    let mut scratch = vec![0f64; side];

    values.chunks_exact_mut(side).for_each(|row| dct.process_dct2(row));
    transpose_inplace(values, &mut scratch, side, side);
    values.chunks_exact_mut(side).for_each(|col| dct.process_dct2(col));
    transpose_inplace(values, &mut scratch, side, side);
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dupes::cluster::hamming_distance;
    use image::{GrayImage, Luma};

    /// Deterministic texture so DCT coefficients are well separated.
    fn textured(offset: u8) -> DynamicImage {
        let mut state = 0x2545_f491u32;
        let img = GrayImage::from_fn(32, 32, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Luma([(state % 200) as u8 + offset])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn inverted(image: &DynamicImage) -> DynamicImage {
        let mut img = image.to_luma8();
        img.pixels_mut().for_each(|p| p.0[0] = 255 - p.0[0]);
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_hash_shape() {
        let hash = DctHasher.hash(&textured(0));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_image_same_hash() {
        assert_eq!(DctHasher.hash(&textured(0)), DctHasher.hash(&textured(0)));
    }

    #[test]
    fn test_brightness_shift_is_close() {
        let a = DctHasher.hash(&textured(0));
        let b = DctHasher.hash(&textured(20));
        assert!(hamming_distance(&a, &b) <= 4, "{} vs {}", a, b);
    }

    #[test]
    fn test_inverted_image_is_far() {
        let original = textured(0);
        let a = DctHasher.hash(&original);
        let b = DctHasher.hash(&inverted(&original));
        assert!(hamming_distance(&a, &b) > 32, "{} vs {}", a, b);
    }

    #[test]
    fn test_hash_image_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        textured(0).save(&path).unwrap();
        assert_eq!(
            DctHasher.hash_image(&path).unwrap(),
            DctHasher.hash(&textured(0))
        );
    }

    #[test]
    fn test_unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(DctHasher.hash_image(&path).is_err());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
