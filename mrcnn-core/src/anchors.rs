//! Feature-pyramid anchor generation.
//!
//! Each pyramid level pairs one backbone stride with one anchor scale; every ratio is used on
//! every level. The resulting [`AnchorSet`] is ordered level by level (the configured scale
//! order), then row-major over the level's feature map, then by ratio. Consumers index the set
//! positionally, so this ordering is part of the contract.

use log::{debug, trace};
use mrcnn_utils::config::AnchorSettings;
use tract_onnx::prelude::Tensor;

use crate::error::{MrcnnError, Result};
use crate::geometry::Bounds;

/// Candidate box `(y1, x1, y2, x2)` in resized-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnchorBox {
    pub y1: f32,
    pub x1: f32,
    pub y2: f32,
    pub x2: f32,
}

impl AnchorBox {
    pub const fn new(y1: f32, x1: f32, y2: f32, x2: f32) -> Self {
        Self { y1, x1, y2, x2 }
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Center `(y, x)` of the box.
    pub fn center(&self) -> (f32, f32) {
        ((self.y1 + self.y2) * 0.5, (self.x1 + self.x2) * 0.5)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.y1, self.x1, self.y2, self.x2]
    }
}

/// One pyramid level: its stride, anchor scale and feature-map shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLevel {
    pub stride: u32,
    pub scale: u32,
    pub rows: usize,
    pub cols: usize,
}

/// Validated pyramid geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    pub backbone_strides: Vec<u32>,
    pub scales: Vec<u32>,
    pub ratios: Vec<f32>,
    pub anchor_stride: u32,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        let AnchorSettings {
            backbone_strides,
            scales,
            ratios,
            anchor_stride,
            ..
        } = AnchorSettings::default();
        Self {
            backbone_strides,
            scales,
            ratios,
            anchor_stride,
        }
    }
}

impl AnchorConfig {
    /// Reject geometry that would produce degenerate or misordered anchors.
    pub fn validate(&self) -> Result<()> {
        if self.backbone_strides.is_empty() {
            return Err(MrcnnError::configuration(
                "at least one backbone stride is required",
            ));
        }
        if self.backbone_strides.len() != self.scales.len() {
            return Err(MrcnnError::configuration(format!(
                "{} backbone strides but {} anchor scales; each level needs exactly one of each",
                self.backbone_strides.len(),
                self.scales.len()
            )));
        }
        if let Some(level) = self.backbone_strides.iter().position(|s| *s == 0) {
            return Err(MrcnnError::configuration(format!(
                "backbone stride for level {level} must be positive"
            )));
        }
        if let Some(level) = self.scales.iter().position(|s| *s == 0) {
            return Err(MrcnnError::configuration(format!(
                "anchor scale for level {level} must be positive"
            )));
        }
        if let Some(level) = self.scales.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(MrcnnError::configuration(format!(
                "anchor scales must be strictly ascending (level {} has {} after {})",
                level + 1,
                self.scales[level + 1],
                self.scales[level]
            )));
        }
        validate_ratios(&self.ratios)?;
        if self.anchor_stride == 0 {
            return Err(MrcnnError::configuration("anchor stride must be positive"));
        }
        Ok(())
    }

    /// Anchors emitted per feature-map cell.
    pub fn anchors_per_cell(&self) -> usize {
        self.ratios.len()
    }

    /// Pyramid levels for an image of the given (resized) bounds.
    pub fn feature_levels(&self, resized: Bounds) -> Result<Vec<FeatureLevel>> {
        self.validate()?;
        let (height, width) = positive_extent(resized)?;
        let shapes = compute_backbone_shapes(height, width, &self.backbone_strides)?;
        Ok(shapes
            .into_iter()
            .zip(self.backbone_strides.iter().zip(&self.scales))
            .map(|((rows, cols), (&stride, &scale))| FeatureLevel {
                stride,
                scale,
                rows,
                cols,
            })
            .collect())
    }

    /// Number of anchors [`generate_pyramid_anchors`] will produce for `resized`.
    pub fn anchor_count(&self, resized: Bounds) -> Result<usize> {
        let step = self.anchor_stride as usize;
        Ok(self
            .feature_levels(resized)?
            .iter()
            .map(|level| {
                level.rows.div_ceil(step) * level.cols.div_ceil(step) * self.anchors_per_cell()
            })
            .sum())
    }
}

impl TryFrom<&AnchorSettings> for AnchorConfig {
    type Error = MrcnnError;

    fn try_from(settings: &AnchorSettings) -> Result<Self> {
        let config = AnchorConfig {
            backbone_strides: settings.backbone_strides.clone(),
            scales: settings.scales.clone(),
            ratios: settings.ratios.clone(),
            anchor_stride: settings.anchor_stride,
        };
        config.validate()?;
        Ok(config)
    }
}

fn validate_ratios(ratios: &[f32]) -> Result<()> {
    if ratios.is_empty() {
        return Err(MrcnnError::configuration(
            "at least one anchor ratio is required",
        ));
    }
    if let Some(ratio) = ratios.iter().find(|r| !r.is_finite() || **r <= 0.0) {
        return Err(MrcnnError::configuration(format!(
            "anchor ratio {ratio} must be a positive finite number"
        )));
    }
    Ok(())
}

fn positive_extent(bounds: Bounds) -> Result<(u32, u32)> {
    if bounds.is_empty() {
        return Err(MrcnnError::construction(format!(
            "cannot build anchors for empty bounds {bounds:?}"
        )));
    }
    Ok((bounds.height() as u32, bounds.width() as u32))
}

/// Feature-map shape `(ceil(height / s), ceil(width / s))` for each stride `s`.
pub fn compute_backbone_shapes(
    height: u32,
    width: u32,
    strides: &[u32],
) -> Result<Vec<(usize, usize)>> {
    strides
        .iter()
        .map(|&stride| {
            if stride == 0 {
                return Err(MrcnnError::configuration("backbone stride must be positive"));
            }
            Ok((
                height.div_ceil(stride) as usize,
                width.div_ceil(stride) as usize,
            ))
        })
        .collect()
}

/// Anchors for a single level.
///
/// For each emitted cell `(row j, col i)` and ratio `r`: `height = scale / sqrt(r)`,
/// `width = scale * sqrt(r)`, centered on `(j * feature_stride, i * feature_stride)`. Only
/// every `anchor_stride`-th row and column emits anchors.
pub fn generate_anchors(
    scale: u32,
    ratios: &[f32],
    shape: (usize, usize),
    feature_stride: u32,
    anchor_stride: u32,
) -> Result<Vec<AnchorBox>> {
    if scale == 0 || feature_stride == 0 || anchor_stride == 0 {
        return Err(MrcnnError::configuration(format!(
            "scale ({scale}), feature stride ({feature_stride}) and anchor stride ({anchor_stride}) must be positive"
        )));
    }
    validate_ratios(ratios)?;

    let scale = scale as f32;
    let sizes: Vec<(f32, f32)> = ratios
        .iter()
        .map(|&ratio| {
            let root = f64::from(ratio).sqrt() as f32;
            (scale / root, scale * root)
        })
        .collect();

    let (rows, cols) = shape;
    let step = anchor_stride as usize;
    let stride = feature_stride as f32;
    let mut boxes = Vec::with_capacity(rows.div_ceil(step) * cols.div_ceil(step) * sizes.len());
    for j in (0..rows).step_by(step) {
        let center_y = j as f32 * stride;
        for i in (0..cols).step_by(step) {
            let center_x = i as f32 * stride;
            for &(height, width) in &sizes {
                boxes.push(AnchorBox {
                    y1: center_y - 0.5 * height,
                    x1: center_x - 0.5 * width,
                    y2: center_y + 0.5 * height,
                    x2: center_x + 0.5 * width,
                });
            }
        }
    }
    Ok(boxes)
}

/// Position of one level's anchors inside an [`AnchorSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSpan {
    pub level: FeatureLevel,
    pub offset: usize,
    pub len: usize,
}

/// All anchors of a pyramid, levels concatenated in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
    boxes: Vec<AnchorBox>,
    levels: Vec<LevelSpan>,
}

/// Generate the full anchor set for an image with the given resized bounds.
pub fn generate_pyramid_anchors(config: &AnchorConfig, resized: Bounds) -> Result<AnchorSet> {
    let levels = config.feature_levels(resized)?;
    let mut boxes = Vec::with_capacity(config.anchor_count(resized)?);
    let mut spans = Vec::with_capacity(levels.len());

    for level in levels {
        let offset = boxes.len();
        let level_boxes = generate_anchors(
            level.scale,
            &config.ratios,
            (level.rows, level.cols),
            level.stride,
            config.anchor_stride,
        )?;
        trace!(
            "pyramid level stride={} scale={} shape={}x{}: {} anchors",
            level.stride,
            level.scale,
            level.rows,
            level.cols,
            level_boxes.len()
        );
        boxes.extend(level_boxes);
        spans.push(LevelSpan {
            level,
            offset,
            len: boxes.len() - offset,
        });
    }

    debug!(
        "generated {} anchors over {} levels for {}x{} input",
        boxes.len(),
        spans.len(),
        resized.width(),
        resized.height()
    );
    Ok(AnchorSet {
        boxes,
        levels: spans,
    })
}

impl AnchorSet {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[AnchorBox] {
        &self.boxes
    }

    pub fn levels(&self) -> &[LevelSpan] {
        &self.levels
    }

    /// Anchors of the `index`-th level.
    pub fn level_boxes(&self, index: usize) -> Option<&[AnchorBox]> {
        self.levels
            .get(index)
            .map(|span| &self.boxes[span.offset..span.offset + span.len])
    }

    /// Flattened `(y1, x1, y2, x2)` rows.
    pub fn to_flat(&self) -> Vec<f32> {
        self.boxes.iter().flat_map(AnchorBox::to_array).collect()
    }

    /// Engine tensor of shape `[1, N, 4]`.
    pub fn to_tensor(&self) -> Result<Tensor> {
        Tensor::from_shape(&[1, self.len(), 4], &self.to_flat())
            .map_err(|e| MrcnnError::construction(format!("failed to build anchor tensor: {e}")))
    }

    /// Rescale into normalized coordinates for an image of the given bounds.
    ///
    /// `(y1, x1, y2 - 1, x2 - 1) / (h - 1, w - 1, h - 1, w - 1)`, the convention of Keras
    /// Mask R-CNN exports.
    pub fn normalized(&self, bounds: Bounds) -> Result<AnchorSet> {
        if bounds.height() < 2 || bounds.width() < 2 {
            return Err(MrcnnError::construction(format!(
                "cannot normalize anchors against {}x{} bounds",
                bounds.width(),
                bounds.height()
            )));
        }
        let scale_y = (bounds.height() - 1) as f32;
        let scale_x = (bounds.width() - 1) as f32;
        let boxes = self
            .boxes
            .iter()
            .map(|b| AnchorBox {
                y1: b.y1 / scale_y,
                x1: b.x1 / scale_x,
                y2: (b.y2 - 1.0) / scale_y,
                x2: (b.x2 - 1.0) / scale_x,
            })
            .collect();
        Ok(AnchorSet {
            boxes,
            levels: self.levels.clone(),
        })
    }
}
