//! Shared configuration types for the Mask R-CNN input workspace.
//!
//! These structures are plain serializable data. Geometry checks (stride/scale pairing,
//! positive values) are performed by `mrcnn-core` when a pipeline is built from them, so a
//! settings file can always be loaded and inspected even when it describes an invalid pyramid.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, str::FromStr};

/// Per-channel means (blue, green, red) of the ImageNet-trained Caffe backbones.
pub const CAFFE_BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// Resize filter preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Triangle filter.
    #[default]
    Quality,
    /// Nearest-neighbour filter.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Working resolution the detector runs at (width x height).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Feature pyramid and anchor geometry.
///
/// `backbone_strides[i]` is paired with `scales[i]`; `ratios` are shared by every level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnchorSettings {
    /// Downsampling factor of each pyramid level relative to the resized image.
    pub backbone_strides: Vec<u32>,
    /// Anchor side length in pixels for each pyramid level.
    pub scales: Vec<u32>,
    /// Width/height ratios emitted at every feature-map cell.
    pub ratios: Vec<f32>,
    /// Emit anchors only on every nth feature-map cell along each axis.
    pub anchor_stride: u32,
    /// Emit anchors in normalized `[0, 1]` coordinates instead of resized-image pixels.
    pub normalize_coordinates: bool,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            backbone_strides: vec![4, 8, 16, 32, 64],
            scales: vec![32, 64, 128, 256, 512],
            ratios: vec![0.5, 1.0, 2.0],
            anchor_stride: 1,
            normalize_coordinates: false,
        }
    }
}

/// Pixel normalization applied while composing the image tensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum NormalizationScheme {
    /// `(v - 127.5) / 127.5`, RGB order. Maps `[0, 255]` onto `[-1, 1]`.
    #[default]
    Centered,
    /// `v - mean`, BGR order. `means` are listed in output (blue, green, red) order.
    MeanSubtracted {
        #[serde(default = "caffe_means")]
        means: [f32; 3],
    },
}

fn caffe_means() -> [f32; 3] {
    CAFFE_BGR_MEANS
}

impl NormalizationScheme {
    /// Mean-subtracted BGR scheme with the Caffe ImageNet means.
    pub const fn caffe() -> Self {
        NormalizationScheme::MeanSubtracted {
            means: CAFFE_BGR_MEANS,
        }
    }
}

impl FromStr for NormalizationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "centered" | "tf" => Ok(NormalizationScheme::Centered),
            "mean_subtracted" | "mean-subtracted" | "caffe" => Ok(NormalizationScheme::caffe()),
            other => Err(format!(
                "invalid normalization scheme '{other}'; expected 'centered' or 'mean_subtracted'"
            )),
        }
    }
}

/// What the pipeline hands the engine as `input_anchors`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorInputMode {
    /// Full feature-pyramid anchor set, shape `(1, N, 4)`.
    #[default]
    Pyramid,
    /// A single box covering the resized image, shape `(1, 1, 4)`.
    Window,
}

impl fmt::Display for AnchorInputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnchorInputMode::Pyramid => "pyramid",
            AnchorInputMode::Window => "window",
        })
    }
}

impl FromStr for AnchorInputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pyramid" => Ok(AnchorInputMode::Pyramid),
            "window" => Ok(AnchorInputMode::Window),
            other => Err(format!(
                "invalid anchor input mode '{other}'; expected 'pyramid' or 'window'"
            )),
        }
    }
}

/// Optional timing logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// One of off, error, warn, info, debug, trace. Unknown values fall back to debug.
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        self.level
            .trim()
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Debug)
    }
}

/// Everything needed to build an input pipeline, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Resize target.
    pub input: InputDimensions,
    /// Number of classes the detector was trained with (background included).
    pub num_classes: usize,
    pub anchors: AnchorSettings,
    pub normalization: NormalizationScheme,
    pub anchor_input: AnchorInputMode,
    pub telemetry: TelemetrySettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input: InputDimensions::default(),
            num_classes: 81,
            anchors: AnchorSettings::default(),
            normalization: NormalizationScheme::default(),
            anchor_input: AnchorInputMode::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))
    }

    /// Write settings to disk as pretty-printed JSON, replacing any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = PipelineSettings {
            normalization: NormalizationScheme::caffe(),
            anchor_input: AnchorInputMode::Window,
            ..PipelineSettings::default()
        };
        settings.save_to_path(file.path()).expect("save");

        let loaded = PipelineSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "input": { "width": 1024, "height": 1024 },
            "num_classes": 2,
            "anchors": { "anchor_stride": 2 }
        }"#;
        fs::write(file.path(), json).expect("write custom settings");

        let loaded = PipelineSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.input.width, 1024);
        assert_eq!(loaded.input.resize_quality, ResizeQuality::Quality);
        assert_eq!(loaded.num_classes, 2);
        assert_eq!(loaded.anchors.anchor_stride, 2);
        assert_eq!(loaded.anchors.backbone_strides, vec![4, 8, 16, 32, 64]);
        assert_eq!(loaded.anchors.ratios, vec![0.5, 1.0, 2.0]);
        assert_eq!(loaded.normalization, NormalizationScheme::Centered);
        assert_eq!(loaded.anchor_input, AnchorInputMode::Pyramid);
    }

    #[test]
    fn normalization_scheme_uses_tagged_json() {
        let scheme: NormalizationScheme =
            serde_json::from_str(r#"{ "scheme": "mean_subtracted" }"#).expect("parse");
        assert_eq!(scheme, NormalizationScheme::caffe());

        let scheme: NormalizationScheme =
            serde_json::from_str(r#"{ "scheme": "mean_subtracted", "means": [1.0, 2.0, 3.0] }"#)
                .expect("parse");
        assert_eq!(
            scheme,
            NormalizationScheme::MeanSubtracted {
                means: [1.0, 2.0, 3.0]
            }
        );

        let json = serde_json::to_string(&NormalizationScheme::Centered).expect("serialize");
        assert_eq!(json, r#"{"scheme":"centered"}"#);
    }

    #[test]
    fn negative_stride_is_rejected_by_parser() {
        let result: std::result::Result<AnchorSettings, _> =
            serde_json::from_str(r#"{ "backbone_strides": [4, -8] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn string_options_parse_case_insensitively() {
        assert_eq!("SPEED".parse::<ResizeQuality>(), Ok(ResizeQuality::Speed));
        assert_eq!(
            "caffe".parse::<NormalizationScheme>(),
            Ok(NormalizationScheme::caffe())
        );
        assert_eq!(
            " Window ".parse::<AnchorInputMode>(),
            Ok(AnchorInputMode::Window)
        );
        assert!("bilinear".parse::<ResizeQuality>().is_err());
    }

    #[test]
    fn telemetry_level_parses_variants() {
        let telemetry = TelemetrySettings {
            level: "TRACE".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Trace);

        let telemetry = TelemetrySettings {
            level: "loud".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Debug);
    }
}
