//! Subject locator benchmarks.
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package vreel-media --bench skin_tone
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use std::time::Duration;
use vreel_media::{Frame, SkinToneConfig, SkinToneLocator, SubjectLocator};

/// Synthetic frame: textured background with one skin-coloured block right of center.
fn create_test_frame(width: u32, height: u32) -> Frame {
    let mut image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 11) % 96) as u8,
            ((x * 13 + y * 17) % 128) as u8,
            ((x * 19 + y * 23) % 96) as u8,
        ])
    });

    let (x0, x1) = (width * 55 / 100, width * 65 / 100);
    let (y0, y1) = (height / 6, height / 2);
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, Rgb([224, 172, 140]));
        }
    }

    Frame::new(image, 0.0)
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("skin_tone_detect");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    let locator = SkinToneLocator::default();
    for (width, height) in [(1920, 1080), (1280, 720), (640, 360)] {
        let frame = create_test_frame(width, height);
        group.bench_with_input(
            BenchmarkId::new("default", format!("{}x{}", width, height)),
            &frame,
            |b, frame| b.iter(|| locator.detect(black_box(frame))),
        );
    }

    group.finish();
}

fn bench_analysis_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("skin_tone_analysis_width");
    let frame = create_test_frame(1920, 1080);

    for analysis_width in [160, 320, 640] {
        let locator = SkinToneLocator::new(SkinToneConfig {
            analysis_width,
            ..SkinToneConfig::default()
        });
        group.bench_with_input(
            BenchmarkId::from_parameter(analysis_width),
            &frame,
            |b, frame| b.iter(|| locator.detect(black_box(frame))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_detect, bench_analysis_width);
criterion_main!(benches);
