//! End-to-end preparation of the three detector inputs for one image.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use image::DynamicImage;
use log::{Level, debug, warn};
use mrcnn_utils::{
    config::{AnchorInputMode, NormalizationScheme, PipelineSettings, ResizeQuality},
    load_image, timing_guard,
};
use rayon::prelude::*;
use tract_onnx::prelude::Tensor;

use crate::anchors::{AnchorConfig, AnchorSet, generate_pyramid_anchors};
use crate::error::{MrcnnError, Result};
use crate::geometry::{Bounds, InputSize};
use crate::meta::{ImageMeta, compose_image_meta};
use crate::normalize::PixelNormalizer;
use crate::resize::{ExactResizer, Resizer};
use crate::tensor::{PixelTensor, compose_pixel_tensor};

/// Engine input name of the pixel tensor.
pub const INPUT_IMAGE: &str = "input_image";
/// Engine input name of the metadata vector.
pub const INPUT_IMAGE_META: &str = "input_image_meta";
/// Engine input name of the anchor tensor.
pub const INPUT_ANCHORS: &str = "input_anchors";

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input_size: InputSize,
    pub resize_quality: ResizeQuality,
    /// Length of the class-activity segment of the metadata.
    pub num_classes: usize,
    pub anchors: AnchorConfig,
    /// Emit anchors in normalized coordinates instead of pixels.
    pub normalize_anchors: bool,
    pub normalization: NormalizationScheme,
    pub anchor_input: AnchorInputMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size: InputSize::default(),
            resize_quality: ResizeQuality::default(),
            num_classes: 81,
            anchors: AnchorConfig::default(),
            normalize_anchors: false,
            normalization: NormalizationScheme::default(),
            anchor_input: AnchorInputMode::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_size.width == 0 || self.input_size.height == 0 {
            return Err(MrcnnError::configuration(format!(
                "input size {}x{} must be non-empty",
                self.input_size.width, self.input_size.height
            )));
        }
        self.anchors.validate()
    }
}

impl TryFrom<&PipelineSettings> for PipelineConfig {
    type Error = MrcnnError;

    fn try_from(settings: &PipelineSettings) -> Result<Self> {
        let config = PipelineConfig {
            input_size: (&settings.input).into(),
            resize_quality: settings.input.resize_quality,
            num_classes: settings.num_classes,
            anchors: AnchorConfig::try_from(&settings.anchors)?,
            normalize_anchors: settings.anchors.normalize_coordinates,
            normalization: settings.normalization,
            anchor_input: settings.anchor_input,
        };
        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<PipelineSettings> for PipelineConfig {
    type Error = MrcnnError;

    fn try_from(settings: PipelineSettings) -> Result<Self> {
        PipelineConfig::try_from(&settings)
    }
}

/// The anchor input handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorInput {
    /// Full pyramid, shared between images with the same resized bounds.
    Pyramid(Arc<AnchorSet>),
    /// One box covering the resized image.
    Window(Bounds),
}

impl AnchorInput {
    /// Number of boxes in the tensor.
    pub fn len(&self) -> usize {
        match self {
            AnchorInput::Pyramid(set) => set.len(),
            AnchorInput::Window(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[1, N, 4]` tensor of `(y1, x1, y2, x2)` rows.
    pub fn to_tensor(&self) -> Result<Tensor> {
        match self {
            AnchorInput::Pyramid(set) => set.to_tensor(),
            AnchorInput::Window(bounds) => Tensor::from_shape(&[1, 1, 4], &bounds.to_yxyx())
                .map_err(|e| {
                    MrcnnError::construction(format!("failed to build window tensor: {e}"))
                }),
        }
    }
}

/// Everything the detector needs for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInputs {
    pub image: PixelTensor,
    pub meta: ImageMeta,
    pub anchors: AnchorInput,
}

impl PreparedInputs {
    /// Engine tensors keyed by their graph input names.
    pub fn named_tensors(&self) -> Result<Vec<(&'static str, Tensor)>> {
        Ok(vec![
            (INPUT_IMAGE, self.image.to_tensor()?),
            (INPUT_IMAGE_META, self.meta.to_tensor()?),
            (INPUT_ANCHORS, self.anchors.to_tensor()?),
        ])
    }
}

/// Resizes, normalizes and annotates images for a Mask R-CNN style detector.
///
/// A pipeline is immutable once built and can be shared across threads.
#[derive(Debug)]
pub struct InputPipeline {
    config: PipelineConfig,
    resizer: Box<dyn Resizer>,
    normalizer: Box<dyn PixelNormalizer>,
    target_anchors: Option<(Bounds, Arc<AnchorSet>)>,
}

impl InputPipeline {
    /// Validate `config` and precompute the anchors for the target size.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let target = Bounds::from_dimensions(config.input_size.width, config.input_size.height);
        let target_anchors = match config.anchor_input {
            AnchorInputMode::Pyramid => Some((target, Arc::new(build_anchors(&config, target)?))),
            AnchorInputMode::Window => {
                warn!(
                    "anchor input mode 'window' feeds a single box instead of pyramid anchors; \
                     detectors trained with pyramid anchors will produce meaningless proposals"
                );
                None
            }
        };
        let normalizer: Box<dyn PixelNormalizer> = config.normalization.into();
        debug!(
            "input pipeline ready: {}x{} target, {} classes, {} normalization, {} anchors",
            config.input_size.width,
            config.input_size.height,
            config.num_classes,
            normalizer.name(),
            config.anchor_input
        );
        Ok(Self {
            resizer: Box::new(ExactResizer::new(config.resize_quality)),
            normalizer,
            config,
            target_anchors,
        })
    }

    /// Build a pipeline straight from persisted settings.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        Self::new(PipelineConfig::try_from(settings)?)
    }

    /// Replace the resize strategy.
    pub fn with_resizer<R: Resizer + 'static>(mut self, resizer: R) -> Self {
        self.resizer = Box::new(resizer);
        self
    }

    /// Replace the pixel normalizer chosen by the configuration.
    pub fn with_normalizer<N: PixelNormalizer + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &dyn PixelNormalizer {
        self.normalizer.as_ref()
    }

    /// Prepare one image with image id 0.
    pub fn prepare(&self, image: &DynamicImage) -> Result<PreparedInputs> {
        self.prepare_with_id(image, 0)
    }

    pub fn prepare_with_id(&self, image: &DynamicImage, image_id: u32) -> Result<PreparedInputs> {
        let mut guard = timing_guard("mrcnn_core::prepare", Level::Debug);
        let original = Bounds::from_dimensions(image.width(), image.height());
        if original.is_empty() {
            return Err(MrcnnError::construction(format!(
                "cannot prepare a {}x{} image",
                image.width(),
                image.height()
            )));
        }

        let resized = self.resizer.resize(image, self.config.input_size)?;
        if resized.bounds.is_empty() {
            return Err(MrcnnError::construction(format!(
                "resizer produced empty bounds {:?}",
                resized.bounds
            )));
        }
        let pixels = compose_pixel_tensor(&resized.image, self.normalizer.as_ref())?;

        let scale = resized.bounds.height() as f32 / original.height() as f32;
        let meta = compose_image_meta(
            image_id,
            original,
            resized.bounds,
            resized.window,
            scale,
            self.config.num_classes,
        );
        let anchors = self.anchor_input(resized.bounds)?;
        guard.record_items(anchors.len());

        debug!(
            "prepared image {}: {}x{} -> {}x{}, scale {:.4}, {} anchors",
            image_id,
            original.width(),
            original.height(),
            resized.bounds.width(),
            resized.bounds.height(),
            scale,
            anchors.len()
        );
        Ok(PreparedInputs {
            image: pixels,
            meta,
            anchors,
        })
    }

    /// Prepare many images in parallel. Image ids follow the slice order and each image
    /// succeeds or fails on its own.
    pub fn prepare_batch(&self, images: &[DynamicImage]) -> Vec<Result<PreparedInputs>> {
        let mut guard = timing_guard("mrcnn_core::prepare_batch", Level::Info);
        guard.record_items(images.len());
        images
            .par_iter()
            .enumerate()
            .map(|(index, image)| {
                let image_id = u32::try_from(index).unwrap_or(u32::MAX);
                self.prepare_with_id(image, image_id)
            })
            .collect()
    }

    /// Load an image from disk and prepare it.
    pub fn prepare_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<PreparedInputs> {
        let path_ref = path.as_ref();
        let image = load_image(path_ref)?;
        self.prepare(&image)
            .with_context(|| format!("failed to prepare {}", path_ref.display()))
    }

    fn anchor_input(&self, resized: Bounds) -> Result<AnchorInput> {
        match self.config.anchor_input {
            AnchorInputMode::Window => Ok(AnchorInput::Window(resized)),
            AnchorInputMode::Pyramid => match &self.target_anchors {
                Some((bounds, set)) if *bounds == resized => Ok(AnchorInput::Pyramid(Arc::clone(set))),
                _ => Ok(AnchorInput::Pyramid(Arc::new(build_anchors(
                    &self.config,
                    resized,
                )?))),
            },
        }
    }
}

fn build_anchors(config: &PipelineConfig, bounds: Bounds) -> Result<AnchorSet> {
    let mut guard = timing_guard("mrcnn_core::generate_pyramid_anchors", Level::Debug);
    let anchors = generate_pyramid_anchors(&config.anchors, bounds)?;
    guard.record_items(anchors.len());
    if config.normalize_anchors {
        anchors.normalized(bounds)
    } else {
        Ok(anchors)
    }
}
