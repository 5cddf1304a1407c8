//! Composition of the `(1, H, W, 3)` image tensor.

use log::trace;
use ndarray::{Array3, ArrayView3};
use tract_onnx::prelude::Tensor;

use crate::error::{MrcnnError, Result};
use crate::normalize::{PixelNormalizer, PixelSource};

/// Normalized image in `(row, col, channel)` order, exposed to the engine as `(1, H, W, 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTensor {
    pixels: Array3<f32>,
}

impl PixelTensor {
    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    /// Engine-facing shape `[1, H, W, 3]`.
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height(), self.width(), 3]
    }

    /// Normalized channels of the pixel at `(row, col)`.
    pub fn pixel(&self, row: usize, col: usize) -> Option<[f32; 3]> {
        if row >= self.height() || col >= self.width() {
            return None;
        }
        Some([
            self.pixels[(row, col, 0)],
            self.pixels[(row, col, 1)],
            self.pixels[(row, col, 2)],
        ])
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.pixels.view()
    }

    /// Contiguous values in `(row, col, channel)` order.
    pub fn as_slice(&self) -> &[f32] {
        self.pixels
            .as_slice()
            .expect("pixel buffers are always built in standard layout")
    }

    /// Copy the pixels into an engine tensor of shape `[1, H, W, 3]`.
    pub fn to_tensor(&self) -> Result<Tensor> {
        Tensor::from_shape(&self.shape(), self.as_slice())
            .map_err(|e| MrcnnError::construction(format!("failed to build image tensor: {e}")))
    }
}

/// Normalize every pixel of `image` into a [`PixelTensor`].
///
/// Pixels are visited once each, row by row; the tensor takes the image's own size.
pub fn compose_pixel_tensor<S>(image: &S, normalizer: &dyn PixelNormalizer) -> Result<PixelTensor>
where
    S: PixelSource + ?Sized,
{
    let (width, height) = image.size();
    if width == 0 || height == 0 {
        return Err(MrcnnError::construction(format!(
            "cannot build an image tensor from a {width}x{height} image"
        )));
    }

    let (w, h) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(w * h * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&normalizer.normalize(image.rgb16(x, y)));
        }
    }

    let pixels = Array3::from_shape_vec((h, w, 3), data)
        .map_err(|e| MrcnnError::construction(format!("pixel buffer has the wrong size: {e}")))?;
    trace!(
        "composed {}x{} image tensor with {} normalization",
        w,
        h,
        normalizer.name()
    );
    Ok(PixelTensor { pixels })
}
