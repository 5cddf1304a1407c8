use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};
use mrcnn_core::{InputPipeline, PipelineConfig};
use mrcnn_utils::config::{NormalizationScheme, ResizeQuality};

fn benchmark_image() -> DynamicImage {
    let image = RgbImage::from_fn(1280, 720, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(image)
}

fn pipeline_configs() -> Vec<(&'static str, PipelineConfig)> {
    vec![
        ("centered_quality", PipelineConfig::default()),
        (
            "centered_speed",
            PipelineConfig {
                resize_quality: ResizeQuality::Speed,
                ..PipelineConfig::default()
            },
        ),
        (
            "caffe_quality",
            PipelineConfig {
                normalization: NormalizationScheme::caffe(),
                ..PipelineConfig::default()
            },
        ),
    ]
}

fn benchmark_prepare(c: &mut Criterion) {
    let image = benchmark_image();

    let mut group = c.benchmark_group("prepare");
    for (label, config) in pipeline_configs() {
        let pipeline = InputPipeline::new(config).expect("benchmark config is valid");
        group.bench_with_input(BenchmarkId::from_parameter(label), &pipeline, |b, pipeline| {
            b.iter(|| {
                pipeline
                    .prepare(black_box(&image))
                    .expect("preparation should succeed")
            });
        });
    }
    group.finish();

    let pipeline = InputPipeline::new(PipelineConfig::default()).expect("pipeline");
    let batch: Vec<DynamicImage> = (0..8).map(|_| image.clone()).collect();
    c.bench_function("prepare_batch_8", |b| {
        b.iter(|| pipeline.prepare_batch(black_box(&batch)));
    });
}

criterion_group!(benches, benchmark_prepare);
criterion_main!(benches);
