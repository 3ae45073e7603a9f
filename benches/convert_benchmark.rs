use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};

use fastconvert::processing::{compute_target_dimensions, EncodeParams, ImageCodec, ImageRsCodec};
use fastconvert::{ConversionOptions, ResizeSpec, TargetFormat};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn benchmark_resize(c: &mut Criterion) {
    let codec = ImageRsCodec::new();
    let spec = ResizeSpec::height(768);
    let mut group = c.benchmark_group("resize");

    for (width, height) in [(1600, 1200), (4000, 3000)] {
        let image = gradient(width, height);
        let Some((w, h)) = compute_target_dimensions(width, height, &spec) else {
            continue;
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &image,
            |b, image| b.iter(|| codec.resize(black_box(image.clone()), w, h)),
        );
    }
    group.finish();
}

fn benchmark_sharpen(c: &mut Criterion) {
    let codec = ImageRsCodec::new();
    let image = gradient(1024, 768);

    c.bench_function("sharpen 1024x768", |b| {
        b.iter(|| codec.enhance_sharpness(black_box(image.clone()), 1.5));
    });
}

fn benchmark_encode(c: &mut Criterion) {
    let codec = ImageRsCodec::new();
    let image = gradient(1024, 768);
    let mut group = c.benchmark_group("encode");
    group.sample_size(10);

    for format in [TargetFormat::Jpeg, TargetFormat::Png, TargetFormat::WebP] {
        let params = EncodeParams::from_options(&ConversionOptions::new(format));
        group.bench_function(format.to_string(), |b| {
            b.iter(|| codec.encode(black_box(&image), &params));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_resize, benchmark_sharpen, benchmark_encode);
criterion_main!(benches);
