//! Single-scale image classification on top of the same tensor composer.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use image::DynamicImage;
use log::debug;
use mrcnn_utils::{
    config::{NormalizationScheme, ResizeQuality},
    timing_guard,
};
use tract_onnx::prelude::Tensor;

use crate::engine::{InferenceEngine, run_engine, validate_results};
use crate::error::{MrcnnError, Result};
use crate::geometry::InputSize;
use crate::normalize::PixelNormalizer;
use crate::resize::{ExactResizer, Resizer};
use crate::tensor::compose_pixel_tensor;

/// Input convention of the classification graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierMode {
    /// 299x299 input, centered RGB pixels.
    Tensorflow,
    /// 224x224 input, mean-subtracted BGR pixels.
    Caffe,
}

impl ClassifierMode {
    pub fn input_size(self) -> InputSize {
        match self {
            ClassifierMode::Tensorflow => InputSize::new(299, 299),
            ClassifierMode::Caffe => InputSize::new(224, 224),
        }
    }

    pub fn normalization(self) -> NormalizationScheme {
        match self {
            ClassifierMode::Tensorflow => NormalizationScheme::Centered,
            ClassifierMode::Caffe => NormalizationScheme::caffe(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassifierMode::Tensorflow => "tf",
            ClassifierMode::Caffe => "caffe",
        }
    }
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierMode {
    type Err = MrcnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "tf" => Ok(ClassifierMode::Tensorflow),
            "caffe" => Ok(ClassifierMode::Caffe),
            other => Err(MrcnnError::configuration(format!(
                "unknown image mode '{other}'; expected 'tf' or 'caffe'"
            ))),
        }
    }
}

/// Class names indexed by output position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// One label per line. Blank lines keep their index.
    pub fn parse(contents: &str) -> Self {
        Self::new(contents.lines().map(|line| line.trim_end().to_string()).collect())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Label for `index`, or the index itself when no label is known.
    pub fn get(&self, index: usize) -> Cow<'_, str> {
        match self.names.get(index) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(index.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Scores of one classification, in model output order.
#[derive(Debug, Clone)]
pub struct Predictions {
    scores: Vec<f32>,
    labels: Arc<Labels>,
}

impl Predictions {
    pub fn new(scores: Vec<f32>, labels: Arc<Labels>) -> Self {
        Self { scores, labels }
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The `n` highest scores, best first. Asking for more than exist returns them all.
    pub fn best(&self, n: usize) -> Vec<Prediction> {
        let mut ranked: Vec<(usize, f32)> = self.scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
            .into_iter()
            .map(|(index, score)| Prediction {
                index,
                label: self.labels.get(index).into_owned(),
                score,
            })
            .collect()
    }
}

/// Graph wiring for a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    pub input_layer: String,
    pub output_layer: String,
    pub resize_quality: ResizeQuality,
}

impl ClassifierConfig {
    pub fn new(
        mode: ClassifierMode,
        input_layer: impl Into<String>,
        output_layer: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            input_layer: input_layer.into(),
            output_layer: output_layer.into(),
            resize_quality: ResizeQuality::default(),
        }
    }
}

/// Runs a classification graph and ranks its scores.
#[derive(Debug)]
pub struct Classifier<E> {
    engine: E,
    config: ClassifierConfig,
    labels: Arc<Labels>,
    resizer: ExactResizer,
    normalizer: Box<dyn PixelNormalizer>,
}

impl<E: InferenceEngine> Classifier<E> {
    pub fn new(engine: E, config: ClassifierConfig) -> Result<Self> {
        if config.input_layer.trim().is_empty() || config.output_layer.trim().is_empty() {
            return Err(MrcnnError::configuration(
                "classifier input and output layer names must be set",
            ));
        }
        Ok(Self {
            engine,
            resizer: ExactResizer::new(config.resize_quality),
            normalizer: config.mode.normalization().into(),
            config,
            labels: Arc::new(Labels::default()),
        })
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Arc::new(labels);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Predictions> {
        let _guard = timing_guard("mrcnn_core::classify", log::Level::Debug);
        let resized = self.resizer.resize(image, self.config.mode.input_size())?;
        let input = compose_pixel_tensor(&resized.image, self.normalizer.as_ref())?.to_tensor()?;

        let inputs: [(&str, &Tensor); 1] = [(self.config.input_layer.as_str(), &input)];
        let results = run_engine(
            &self.engine,
            &inputs,
            &[self.config.output_layer.as_str()],
        )?;
        let rows = validate_results(&results)?;
        let scores = rows.row(0).to_vec();
        debug!(
            "{} classifier produced {} scores",
            self.config.mode,
            scores.len()
        );
        Ok(Predictions::new(scores, Arc::clone(&self.labels)))
    }

    pub fn classify_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Predictions> {
        let path_ref = path.as_ref();
        let image = mrcnn_utils::load_image(path_ref)?;
        self.classify(&image)
            .with_context(|| format!("classification failed for {}", path_ref.display()))
    }
}
