use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, imageops::FilterType};

use crate::config::ResizeQuality;

/// Decode an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Map a resize preference onto an `image` sampling filter.
pub fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::Quality => FilterType::Triangle,
        ResizeQuality::Speed => FilterType::Nearest,
    }
}

/// Stretch an image to exactly `width` x `height` and convert it to 8-bit RGB.
///
/// Images already at the requested size are only converted.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.to_rgb8();
    }
    image.resize_exact(width, height, filter).to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn resize_image_hits_exact_dimensions() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(600, 400, Rgb([10, 20, 30])));
        let resized = resize_image(&source, 800, 800, resize_filter(ResizeQuality::Speed));
        assert_eq!(resized.dimensions(), (800, 800));
        assert_eq!(resized.get_pixel(799, 799), &Rgb([10, 20, 30]));
    }

    #[test]
    fn same_size_is_a_conversion_only() {
        let mut source = RgbImage::new(3, 2);
        source.put_pixel(2, 1, Rgb([1, 2, 3]));
        let resized = resize_image(
            &DynamicImage::ImageRgb8(source.clone()),
            3,
            2,
            resize_filter(ResizeQuality::Quality),
        );
        assert_eq!(resized, source);
    }

    #[test]
    fn load_image_reads_png_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        RgbImage::from_pixel(4, 3, Rgb([9, 8, 7])).save(&path).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));

        let err = load_image(dir.path().join("missing.png")).unwrap_err();
        assert!(err.to_string().contains("missing.png"));
    }
}
