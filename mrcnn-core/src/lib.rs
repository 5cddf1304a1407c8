//! Input preparation for Mask R-CNN style region-proposal detectors.
//!
//! An [`InputPipeline`] turns an arbitrary image into the three tensors a detector graph
//! expects (`input_image`, `input_image_meta`, `input_anchors`). Executing the graph is left
//! to an [`InferenceEngine`] implementation supplied by the caller.

/// Feature-pyramid anchor generation.
pub mod anchors;
/// Single-scale classification helpers.
pub mod classifier;
/// Mask R-CNN detector wrapper.
pub mod detector;
/// Inference engine seam and result validation.
pub mod engine;
pub mod error;
pub mod geometry;
/// Image metadata vector.
pub mod meta;
/// Pixel sources and normalization strategies.
pub mod normalize;
/// Orchestration of the full preparation step.
pub mod pipeline;
/// Resize strategies.
pub mod resize;
/// Pixel tensor composition.
pub mod tensor;

pub use anchors::{
    AnchorBox, AnchorConfig, AnchorSet, FeatureLevel, LevelSpan, compute_backbone_shapes,
    generate_anchors, generate_pyramid_anchors,
};
pub use classifier::{
    Classifier, ClassifierConfig, ClassifierMode, Labels, Prediction, Predictions,
};
pub use detector::{DEFAULT_OUTPUTS, DetectorOutput, MaskRcnnDetector};
pub use engine::{InferenceEngine, float_rows, run_engine, validate_results};
pub use error::{MrcnnError, Result};
pub use geometry::{Bounds, InputSize};
pub use meta::{IMAGE_DEPTH, ImageMeta, ImageShape, META_SCALAR_FIELDS, compose_image_meta};
pub use normalize::{Centered, MeanSubtracted, PixelNormalizer, PixelSource};
pub use pipeline::{
    AnchorInput, INPUT_ANCHORS, INPUT_IMAGE, INPUT_IMAGE_META, InputPipeline, PipelineConfig,
    PreparedInputs,
};
pub use resize::{ExactResizer, ResizedImage, Resizer};
pub use tensor::{PixelTensor, compose_pixel_tensor};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
