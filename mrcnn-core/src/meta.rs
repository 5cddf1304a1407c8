//! The fixed-layout image metadata vector fed alongside the pixel tensor.
//!
//! Layout (`12 + num_classes` floats):
//!
//! ```text
//! [image_id,
//!  original_height, original_width, original_depth,
//!  resized_height, resized_width, resized_depth,
//!  window_y1, window_x1, window_y2, window_x2,
//!  scale,
//!  class_active_0 .. class_active_{n-1}]
//! ```

use tract_onnx::prelude::Tensor;

use crate::error::{MrcnnError, Result};
use crate::geometry::Bounds;

/// Number of scalar fields preceding the class-activity segment.
pub const META_SCALAR_FIELDS: usize = 12;

/// Channel count recorded for both the original and the resized image.
pub const IMAGE_DEPTH: u32 = 3;

/// Height, width and channel count of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub depth: u32,
}

impl ImageShape {
    /// RGB shape covering `bounds`.
    pub fn of(bounds: Bounds) -> Self {
        Self {
            height: bounds.height().max(0) as u32,
            width: bounds.width().max(0) as u32,
            depth: IMAGE_DEPTH,
        }
    }
}

/// Typed view of the metadata vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMeta {
    pub image_id: u32,
    pub original_shape: ImageShape,
    pub resized_shape: ImageShape,
    /// Valid region of the resized image.
    pub window: Bounds,
    /// `resized_height / original_height`.
    pub scale: f32,
    active_class_ids: Vec<f32>,
}

/// Assemble the metadata for one image. The class-activity segment starts all zero.
pub fn compose_image_meta(
    image_id: u32,
    original: Bounds,
    resized: Bounds,
    window: Bounds,
    scale: f32,
    num_classes: usize,
) -> ImageMeta {
    ImageMeta {
        image_id,
        original_shape: ImageShape::of(original),
        resized_shape: ImageShape::of(resized),
        window,
        scale,
        active_class_ids: vec![0.0; num_classes],
    }
}

impl ImageMeta {
    pub fn num_classes(&self) -> usize {
        self.active_class_ids.len()
    }

    /// Total vector length, `12 + num_classes`.
    pub fn len(&self) -> usize {
        META_SCALAR_FIELDS + self.num_classes()
    }

    /// Never true; the scalar fields are always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn active_class_ids(&self) -> &[f32] {
        &self.active_class_ids
    }

    /// Flag or clear one class. Returns `false` when `class_id` is outside the segment.
    pub fn set_class_active(&mut self, class_id: usize, active: bool) -> bool {
        match self.active_class_ids.get_mut(class_id) {
            Some(slot) => {
                *slot = if active { 1.0 } else { 0.0 };
                true
            }
            None => false,
        }
    }

    /// Flatten into the engine layout.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.len());
        values.push(self.image_id as f32);
        push_shape(&mut values, self.original_shape);
        push_shape(&mut values, self.resized_shape);
        values.extend_from_slice(&self.window.to_yxyx());
        values.push(self.scale);
        values.extend_from_slice(&self.active_class_ids);
        values
    }

    /// Engine tensor of shape `[1, 12 + num_classes]`.
    pub fn to_tensor(&self) -> Result<Tensor> {
        let values = self.to_vec();
        Tensor::from_shape(&[1, values.len()], &values).map_err(|e| {
            MrcnnError::construction(format!("failed to build image meta tensor: {e}"))
        })
    }

    /// Decode a flattened metadata vector.
    pub fn parse(values: &[f32]) -> Result<Self> {
        if values.len() < META_SCALAR_FIELDS {
            return Err(MrcnnError::construction(format!(
                "image meta needs at least {META_SCALAR_FIELDS} values, got {}",
                values.len()
            )));
        }
        let shape = |offset: usize| ImageShape {
            height: values[offset] as u32,
            width: values[offset + 1] as u32,
            depth: values[offset + 2] as u32,
        };
        let window = Bounds::new(
            values[8].round() as i32,
            values[7].round() as i32,
            values[10].round() as i32,
            values[9].round() as i32,
        )?;

        Ok(Self {
            image_id: values[0] as u32,
            original_shape: shape(1),
            resized_shape: shape(4),
            window,
            scale: values[11],
            active_class_ids: values[META_SCALAR_FIELDS..].to_vec(),
        })
    }
}

fn push_shape(values: &mut Vec<f32>, shape: ImageShape) {
    values.extend_from_slice(&[shape.height as f32, shape.width as f32, shape.depth as f32]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta(num_classes: usize) -> ImageMeta {
        let original = Bounds::from_dimensions(600, 400);
        let resized = Bounds::from_dimensions(800, 800);
        compose_image_meta(0, original, resized, resized, 800.0 / 400.0, num_classes)
    }

    #[test]
    fn layout_matches_engine_order() {
        let values = sample_meta(81).to_vec();
        assert_eq!(
            &values[..META_SCALAR_FIELDS],
            &[0.0, 400.0, 600.0, 3.0, 800.0, 800.0, 3.0, 0.0, 0.0, 800.0, 800.0, 2.0]
        );
        assert!(values[META_SCALAR_FIELDS..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn length_tracks_class_count_only() {
        let reference = sample_meta(0).to_vec();
        assert_eq!(reference.len(), META_SCALAR_FIELDS);
        for num_classes in [1, 2, 81, 200] {
            let meta = sample_meta(num_classes);
            let values = meta.to_vec();
            assert_eq!(values.len(), META_SCALAR_FIELDS + num_classes);
            assert_eq!(meta.len(), values.len());
            assert_eq!(&values[..META_SCALAR_FIELDS], reference.as_slice());
        }
    }

    #[test]
    fn window_is_written_in_yxyx_order() {
        let original = Bounds::from_dimensions(100, 50);
        let resized = Bounds::from_dimensions(200, 200);
        let window = Bounds::new(10, 20, 190, 180).unwrap();
        let values = compose_image_meta(7, original, resized, window, 4.0, 2).to_vec();
        assert_eq!(values[0], 7.0);
        assert_eq!(&values[7..11], &[20.0, 10.0, 180.0, 190.0]);
    }

    #[test]
    fn class_flags_can_be_overwritten() {
        let mut meta = sample_meta(3);
        assert!(meta.set_class_active(2, true));
        assert!(!meta.set_class_active(3, true));
        assert_eq!(meta.active_class_ids(), &[0.0, 0.0, 1.0]);
        assert_eq!(meta.to_vec()[META_SCALAR_FIELDS + 2], 1.0);
    }

    #[test]
    fn parse_inverts_to_vec() {
        let mut meta = sample_meta(4);
        meta.image_id = 12;
        meta.set_class_active(1, true);
        let parsed = ImageMeta::parse(&meta.to_vec()).expect("parse");
        assert_eq!(parsed, meta);

        assert!(matches!(
            ImageMeta::parse(&[0.0; 11]),
            Err(MrcnnError::Construction(_))
        ));
    }

    #[test]
    fn tensor_has_batch_dimension() {
        let tensor = sample_meta(81).to_tensor().expect("tensor");
        assert_eq!(tensor.shape(), &[1, 93]);
    }
}
