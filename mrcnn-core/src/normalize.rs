//! Pixel access and per-pixel normalization strategies.
//!
//! Samples travel as 16-bit-scaled RGB triples (`0..=65535`, an 8-bit value `v` widened to
//! `v * 257`). Normalizers only look at the high byte, so 8-bit and 16-bit sources produce
//! identical tensors.

use std::fmt;

use image::{GenericImageView, Pixel};
use mrcnn_utils::config::NormalizationScheme;

/// Read-only pixel grid addressed by `(x, y)`.
pub trait PixelSource {
    /// `(width, height)` in pixels.
    fn size(&self) -> (u32, u32);

    /// RGB sample at `(x, y)` in the 16-bit-scaled convention. Coordinates must be in bounds.
    fn rgb16(&self, x: u32, y: u32) -> [u16; 3];
}

impl<I> PixelSource for I
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8>,
{
    fn size(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn rgb16(&self, x: u32, y: u32) -> [u16; 3] {
        let [r, g, b] = self.get_pixel(x, y).to_rgb().0;
        [widen(r), widen(g), widen(b)]
    }
}

fn widen(value: u8) -> u16 {
    u16::from(value) * 257
}

/// High byte of a 16-bit-scaled sample.
#[inline]
pub fn sample_byte(value: u16) -> f32 {
    f32::from((value >> 8) as u8)
}

/// Maps one RGB sample to the three floats written into the image tensor.
///
/// The output channel order is owned by the implementation.
pub trait PixelNormalizer: Send + Sync + fmt::Debug {
    fn normalize(&self, sample: [u16; 3]) -> [f32; 3];

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// `(v - 127.5) / 127.5` per channel, RGB order.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Centered;

impl PixelNormalizer for Centered {
    #[inline]
    fn normalize(&self, [r, g, b]: [u16; 3]) -> [f32; 3] {
        [centered(r), centered(g), centered(b)]
    }

    fn name(&self) -> &'static str {
        "centered"
    }
}

#[inline]
fn centered(value: u16) -> f32 {
    (sample_byte(value) - 127.5) / 127.5
}

/// `v - mean` per channel with the output in BGR order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanSubtracted {
    /// Means in output order: blue, green, red.
    pub means: [f32; 3],
}

impl MeanSubtracted {
    pub const fn new(means: [f32; 3]) -> Self {
        Self { means }
    }
}

impl Default for MeanSubtracted {
    fn default() -> Self {
        Self::new(mrcnn_utils::CAFFE_BGR_MEANS)
    }
}

impl PixelNormalizer for MeanSubtracted {
    #[inline]
    fn normalize(&self, [r, g, b]: [u16; 3]) -> [f32; 3] {
        [
            sample_byte(b) - self.means[0],
            sample_byte(g) - self.means[1],
            sample_byte(r) - self.means[2],
        ]
    }

    fn name(&self) -> &'static str {
        "mean_subtracted"
    }
}

impl From<NormalizationScheme> for Box<dyn PixelNormalizer> {
    fn from(scheme: NormalizationScheme) -> Self {
        match scheme {
            NormalizationScheme::Centered => Box::new(Centered),
            NormalizationScheme::MeanSubtracted { means } => Box::new(MeanSubtracted::new(means)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn centered_maps_byte_range_onto_unit_interval() {
        assert_eq!(Centered.normalize([0, 0, 0]), [-1.0, -1.0, -1.0]);
        let white = Centered.normalize([255 * 256, 255 * 256, 255 * 256]);
        for channel in white {
            assert!((channel - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn centered_is_monotonic() {
        let mut previous = f32::NEG_INFINITY;
        for byte in 0u16..=255 {
            let [value, _, _] = Centered.normalize([byte << 8, 0, 0]);
            assert!(value > previous, "not increasing at {byte}");
            previous = value;
        }
    }

    #[test]
    fn centered_ignores_the_low_byte() {
        assert_eq!(
            Centered.normalize([0x80ff, 0x8000, 0x8042]),
            Centered.normalize([0x8000, 0x8000, 0x8000])
        );
    }

    #[test]
    fn mean_subtracted_swaps_to_bgr() {
        let normalizer = MeanSubtracted::default();
        let [b, g, r] = normalizer.normalize([200 << 8, 100 << 8, 50 << 8]);
        assert!((b - (50.0 - 103.939)).abs() < 1e-4);
        assert!((g - (100.0 - 116.779)).abs() < 1e-4);
        assert!((r - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn scheme_selects_strategy() {
        let boxed: Box<dyn PixelNormalizer> = NormalizationScheme::Centered.into();
        assert_eq!(boxed.name(), "centered");

        let boxed: Box<dyn PixelNormalizer> = NormalizationScheme::MeanSubtracted {
            means: [1.0, 2.0, 3.0],
        }
        .into();
        assert_eq!(boxed.name(), "mean_subtracted");
        assert_eq!(boxed.normalize([0, 0, 0]), [-1.0, -2.0, -3.0]);
    }

    #[test]
    fn eight_bit_images_widen_to_sixteen_bits() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(1, 0, Rgb([255, 128, 0]));
        assert_eq!(rgb.size(), (2, 1));
        assert_eq!(rgb.rgb16(1, 0), [65535, 128 * 257, 0]);

        let rgba = RgbaImage::from_pixel(1, 1, Rgba([7, 8, 9, 0]));
        assert_eq!(rgba.rgb16(0, 0), [7 * 257, 8 * 257, 9 * 257]);
    }
}
