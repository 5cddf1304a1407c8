//! Resizing images to the detector's working resolution.

use std::fmt;

use image::{DynamicImage, RgbImage};
use mrcnn_utils::{config::ResizeQuality, resize_filter, resize_image, timing_guard};

use crate::error::{MrcnnError, Result};
use crate::geometry::{Bounds, InputSize};

/// A resized image together with the regions the metadata needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizedImage {
    pub image: RgbImage,
    /// Full extent of the resized image.
    pub bounds: Bounds,
    /// Region of `bounds` covered by source pixels.
    pub window: Bounds,
}

/// Abstraction over resize strategies.
pub trait Resizer: Send + Sync + fmt::Debug {
    fn resize(&self, image: &DynamicImage, target: InputSize) -> Result<ResizedImage>;
}

/// Stretches the source to exactly the target size, so the window covers the whole image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExactResizer {
    pub quality: ResizeQuality,
}

impl ExactResizer {
    pub const fn new(quality: ResizeQuality) -> Self {
        Self { quality }
    }
}

impl Resizer for ExactResizer {
    fn resize(&self, image: &DynamicImage, target: InputSize) -> Result<ResizedImage> {
        let _guard = timing_guard("mrcnn_core::resize", log::Level::Trace);
        if image.width() == 0 || image.height() == 0 {
            return Err(MrcnnError::construction(format!(
                "cannot resize a {}x{} image",
                image.width(),
                image.height()
            )));
        }
        if target.width == 0 || target.height == 0 {
            return Err(MrcnnError::construction(format!(
                "resize target {}x{} must be non-empty",
                target.width, target.height
            )));
        }

        let resized = resize_image(image, target.width, target.height, resize_filter(self.quality));
        let bounds = Bounds::from_dimensions(resized.width(), resized.height());
        Ok(ResizedImage {
            image: resized,
            bounds,
            window: bounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn stretches_to_target_with_full_window() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(600, 400, Rgb([1, 2, 3])));
        let resized = ExactResizer::default()
            .resize(&source, InputSize::new(800, 800))
            .unwrap();
        assert_eq!(resized.image.dimensions(), (800, 800));
        assert_eq!(resized.bounds, Bounds::from_dimensions(800, 800));
        assert_eq!(resized.window, resized.bounds);
    }

    #[test]
    fn converts_other_color_types_to_rgb() {
        let source = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([77])));
        let resized = ExactResizer::new(ResizeQuality::Speed)
            .resize(&source, InputSize::new(2, 2))
            .unwrap();
        assert_eq!(resized.image.get_pixel(1, 1), &Rgb([77, 77, 77]));
    }

    #[test]
    fn zero_sized_source_or_target_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 4));
        assert!(matches!(
            ExactResizer::default().resize(&empty, InputSize::default()),
            Err(MrcnnError::Construction(_))
        ));

        let source = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(
            ExactResizer::default().resize(&source, InputSize::new(0, 10)),
            Err(MrcnnError::Construction(_))
        ));
    }
}
