//! Common helpers shared across the Mask R-CNN input crates.

/// Pipeline settings and their JSON persistence.
pub mod config;
/// Image resizing helpers.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use log::LevelFilter;

pub use config::{
    AnchorInputMode, AnchorSettings, CAFFE_BGR_MEANS, InputDimensions, NormalizationScheme,
    PipelineSettings, ResizeQuality, TelemetrySettings,
};
pub use image_utils::{load_image, resize_filter, resize_image};
pub use telemetry::{
    TELEMETRY_TARGET, TimingGuard, configure as configure_telemetry, telemetry_allows,
    telemetry_enabled, timing_guard,
};

/// Initialize logging once for binaries and test harnesses.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Calling this again after
/// a logger is installed is a no-op.
pub fn init_logging(default_filter: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);
    let _ = builder.try_init();
}

/// Apply the telemetry section of a settings file to the global timing state.
pub fn apply_telemetry_settings(settings: &TelemetrySettings) {
    configure_telemetry(settings.enabled, settings.level_filter());
}
