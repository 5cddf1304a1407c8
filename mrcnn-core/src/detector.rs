use std::path::Path;

use anyhow::Context;
use image::DynamicImage;
use log::{debug, warn};
use mrcnn_utils::{config::PipelineSettings, timing_guard};
use ndarray::ArrayView2;
use tract_onnx::prelude::Tensor;

use crate::engine::{InferenceEngine, float_rows, run_engine, validate_results};
use crate::error::{MrcnnError, Result};
use crate::meta::ImageMeta;
use crate::pipeline::{InputPipeline, PreparedInputs};

/// Graph outputs requested from a Keras Mask R-CNN inference export, in order.
pub const DEFAULT_OUTPUTS: [&str; 7] = [
    "mrcnn_detection/Reshape_1",
    "mrcnn_class/Reshape_1",
    "mrcnn_bbox/Reshape",
    "mrcnn_mask/Reshape_1",
    "ROI/packed_2",
    "rpn_class/concat",
    "rpn_bbox/concat",
];

/// Raw engine outputs for one image, keyed by the requested output names.
#[derive(Debug)]
pub struct DetectorOutput {
    /// Metadata that was fed to the engine, needed to map boxes back to the source image.
    pub meta: ImageMeta,
    pub outputs: Vec<(String, Tensor)>,
}

impl DetectorOutput {
    /// Rows of the first output (the detections for the default output list).
    pub fn detection_rows(&self) -> Result<ArrayView2<'_, f32>> {
        match self.outputs.first() {
            Some((_, tensor)) => float_rows(tensor),
            None => Err(MrcnnError::engine_result("result is empty")),
        }
    }

    pub fn output(&self, name: &str) -> Option<&Tensor> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, tensor)| tensor)
    }
}

/// Couples an input pipeline with an inference engine running a Mask R-CNN graph.
#[derive(Debug)]
pub struct MaskRcnnDetector<E> {
    engine: E,
    pipeline: InputPipeline,
    output_names: Vec<String>,
}

impl<E: InferenceEngine> MaskRcnnDetector<E> {
    pub fn new(engine: E, pipeline: InputPipeline) -> Self {
        Self {
            engine,
            pipeline,
            output_names: DEFAULT_OUTPUTS.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn from_settings(engine: E, settings: &PipelineSettings) -> Result<Self> {
        Ok(Self::new(engine, InputPipeline::from_settings(settings)?))
    }

    /// Request a different set of graph outputs.
    pub fn with_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn pipeline(&self) -> &InputPipeline {
        &self.pipeline
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Prepare `image` and run the detector on it.
    pub fn detect(&self, image: &DynamicImage) -> Result<DetectorOutput> {
        let _guard = timing_guard("mrcnn_core::detect", log::Level::Debug);
        let prepared = self.pipeline.prepare(image)?;
        self.detect_prepared(prepared)
    }

    /// Load an image from disk and run the detector on it.
    pub fn detect_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<DetectorOutput> {
        let path_ref = path.as_ref();
        let image = mrcnn_utils::load_image(path_ref)?;
        self.detect(&image)
            .with_context(|| format!("detection failed for {}", path_ref.display()))
    }

    /// Run the engine on inputs that were already prepared.
    pub fn detect_prepared(&self, prepared: PreparedInputs) -> Result<DetectorOutput> {
        let tensors = prepared.named_tensors()?;
        let inputs: Vec<(&str, &Tensor)> =
            tensors.iter().map(|(name, tensor)| (*name, tensor)).collect();
        let outputs: Vec<&str> = self.output_names.iter().map(String::as_str).collect();

        let results = {
            let _guard = timing_guard("mrcnn_core::inference", log::Level::Debug);
            run_engine(&self.engine, &inputs, &outputs)?
        };
        let rows = validate_results(&results)?.nrows();
        if results.len() != outputs.len() {
            warn!(
                "engine returned {} outputs for {} requested names",
                results.len(),
                outputs.len()
            );
        }
        debug!(
            "image {}: engine returned {} outputs, {} rows in {}",
            prepared.meta.image_id,
            results.len(),
            rows,
            outputs.first().copied().unwrap_or("<unnamed>")
        );

        Ok(DetectorOutput {
            meta: prepared.meta,
            outputs: self.output_names.iter().cloned().zip(results).collect(),
        })
    }
}
