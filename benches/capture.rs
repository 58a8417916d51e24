use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use volume_bridge::core::capture::{
    compose_color_texture, compose_depth_texture, normalize_in_place, BufferKind, FrameSnapshot, NormalizedPixels,
    RgbaTexture,
};
use volume_bridge::core::publisher::FrameHeader;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 800;

/// Deterministic pseudo-depth values with a background plateau
fn synthetic_buffer(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let v = ((i as u32).wrapping_mul(2654435761) >> 8) as f32 / 16_777_216.0;
            if v > 0.8 {
                1.0
            } else {
                v
            }
        })
        .collect()
}

fn normalized(kind: BufferKind) -> NormalizedPixels {
    let len = (WIDTH * HEIGHT) as usize * kind.channels();
    NormalizedPixels::from_snapshot(FrameSnapshot::new(kind, WIDTH, HEIGHT, synthetic_buffer(len)))
}

/// Benchmark: min/max normalization per buffer kind
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for kind in [BufferKind::Depth, BufferKind::Color] {
        let source = synthetic_buffer((WIDTH * HEIGHT) as usize * kind.channels());
        group.bench_with_input(BenchmarkId::new("800x800", kind), &source, |b, source| {
            b.iter_batched(
                || source.clone(),
                |mut data| {
                    normalize_in_place(&mut data);
                    black_box(data)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Benchmark: composing the publish textures from normalized buffers
fn bench_compose(c: &mut Criterion) {
    let depth = normalized(BufferKind::Depth);
    let color = normalized(BufferKind::Color);
    let mut depth_target = RgbaTexture::depth_target(WIDTH, HEIGHT);
    let mut color_target = RgbaTexture::zeroed(WIDTH, HEIGHT);

    c.bench_function("compose_depth_800x800", |b| {
        b.iter(|| compose_depth_texture(black_box(&depth), &mut depth_target))
    });

    c.bench_function("compose_color_800x800", |b| {
        b.iter(|| compose_color_texture(black_box(&color), &mut color_target))
    });
}

/// Benchmark: shared frame header encoding
fn bench_frame_header(c: &mut Criterion) {
    let header = FrameHeader {
        width: WIDTH,
        height: HEIGHT,
        frame: 42,
        flags: 0,
    };

    c.bench_function("frame_header_encode", |b| b.iter(|| black_box(header).encode()));
}

criterion_group!(benches, bench_normalize, bench_compose, bench_frame_header);
criterion_main!(benches);
