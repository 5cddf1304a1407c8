//! Integer image geometry shared by the composers and the anchor generator.

use mrcnn_utils::config::InputDimensions;

use crate::error::{MrcnnError, Result};

/// Integer rectangle in pixel coordinates, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Bounds {
    /// Build a rectangle, rejecting negative extents.
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Result<Self> {
        if max_x < min_x || max_y < min_y {
            return Err(MrcnnError::construction(format!(
                "bounds ({min_x}, {min_y}, {max_x}, {max_y}) have a negative extent"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Rectangle anchored at the origin with the given size.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: clamp_to_i32(width),
            max_y: clamp_to_i32(height),
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    /// `true` when either side has zero length.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Corners in detector order `(y1, x1, y2, x2)`.
    pub fn to_yxyx(&self) -> [f32; 4] {
        [
            self.min_y as f32,
            self.min_x as f32,
            self.max_y as f32,
            self.max_x as f32,
        ]
    }
}

fn clamp_to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Working resolution the image is resized to before tensor composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(800, 800)
    }
}

impl From<InputDimensions> for InputSize {
    fn from(dimensions: InputDimensions) -> Self {
        InputSize::new(dimensions.width, dimensions.height)
    }
}

impl From<&InputDimensions> for InputSize {
    fn from(dimensions: &InputDimensions) -> Self {
        (*dimensions).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_and_height_follow_corners() {
        let bounds = Bounds::new(10, 20, 610, 420).unwrap();
        assert_eq!(bounds.width(), 600);
        assert_eq!(bounds.height(), 400);
        assert!(!bounds.is_empty());
        assert_eq!(bounds.to_yxyx(), [20.0, 10.0, 420.0, 610.0]);
    }

    #[test]
    fn negative_extent_is_rejected() {
        assert!(matches!(
            Bounds::new(5, 0, 4, 10),
            Err(MrcnnError::Construction(_))
        ));
        assert!(Bounds::new(0, 0, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn input_size_from_settings() {
        let dims = InputDimensions {
            width: 1024,
            height: 512,
            ..InputDimensions::default()
        };
        assert_eq!(InputSize::from(dims), InputSize::new(1024, 512));
        assert_eq!(InputSize::default(), InputSize::new(800, 800));
    }
}
