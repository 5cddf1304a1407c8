use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mrcnn_core::{AnchorConfig, Bounds, generate_pyramid_anchors};

const SIDES: [u32; 3] = [512, 800, 1024];

fn benchmark_pyramid_anchors(c: &mut Criterion) {
    let config = AnchorConfig::default();

    let mut group = c.benchmark_group("generate_pyramid_anchors");
    for side in SIDES {
        let bounds = Bounds::from_dimensions(side, side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &bounds, |b, bounds| {
            b.iter(|| {
                generate_pyramid_anchors(&config, black_box(*bounds))
                    .expect("default anchor config is valid")
            });
        });
    }
    group.finish();

    let bounds = Bounds::from_dimensions(1024, 1024);
    let anchors = generate_pyramid_anchors(&config, bounds).expect("anchors");
    c.bench_function("anchor_set_to_tensor_1024", |b| {
        b.iter(|| black_box(&anchors).to_tensor().expect("tensor"));
    });
    c.bench_function("anchor_set_normalized_1024", |b| {
        b.iter(|| black_box(&anchors).normalized(bounds).expect("normalized"));
    });
}

criterion_group!(benches, benchmark_pyramid_anchors);
criterion_main!(benches);
