use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, ImageFormat, RgbImage};

use crate::error::Error;

pub const COMPARISON_MAX_WIDTH: u32 = 400;
pub const COMPARISON_MAX_HEIGHT: u32 = 200;

/// Shrink to fit the comparison box. Smaller images are left alone.
fn fit(image: DynamicImage) -> RgbImage {
    let fitted = if image.width() > COMPARISON_MAX_WIDTH || image.height() > COMPARISON_MAX_HEIGHT {
        image.thumbnail(COMPARISON_MAX_WIDTH, COMPARISON_MAX_HEIGHT)
    } else {
        image
    };
    fitted.into_rgb8()
}

/// Paste two thumbnails next to each other and save the result as JPEG at `dest`.
pub fn create_comparison(first: &Path, second: &Path, dest: &Path) -> Result<PathBuf, Error> {
    let left = fit(image::open(first)?);
    let right = fit(image::open(second)?);

    let mut canvas = RgbImage::new(left.width() + right.width(), left.height().max(right.height()));
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(left.width()), 0);

    DynamicImage::ImageRgb8(canvas).save_with_format(dest, ImageFormat::Jpeg)?;
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn solid(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_comparison_is_side_by_side() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        solid(&a, 800, 400, [255, 0, 0]);
        solid(&b, 100, 50, [0, 0, 255]);

        let out = create_comparison(&a, &b, &dir.path().join("cmp.jpg")).unwrap();
        let combined = image::open(out).unwrap();
        // 800x400 shrinks to 400x200; 100x50 is kept
        assert_eq!(combined.width(), 500);
        assert_eq!(combined.height(), 200);
    }

    #[test]
    fn test_missing_thumbnail_is_an_error() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        solid(&a, 10, 10, [0, 0, 0]);
        let result = create_comparison(&a, &dir.path().join("missing.png"), &dir.path().join("cmp.jpg"));
        assert!(result.is_err());
    }
}
