use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_preview::{
    glyph::{self, coverage_to_rgba, glyph_quad},
    shader::{image_vertex_shader, letterbox},
};

pub fn benchmark_rgba(c: &mut Criterion) {
    // roughly the size of a digit rasterized at the overlay font size
    let sizes = [(64, 96), (160, 240), (240, 400)];

    let mut group = c.benchmark_group("glyph/rgba");
    for (width, height) in sizes.iter() {
        let coverage = vec![0x7fu8; width * height];
        group.bench_with_input(format!("{}x{}", width, height), &coverage, |b, cov| {
            b.iter(|| coverage_to_rgba(cov))
        });
    }
    group.finish();
}

pub fn benchmark_setup(c: &mut Criterion) {
    let windows = [(1024, 768), (1920, 1080), (3840, 2160)];

    let mut group = c.benchmark_group("setup");
    for window in windows.iter() {
        group.bench_with_input(
            format!("quads/{}x{}", window.0, window.1),
            window,
            |b, window| {
                b.iter(|| {
                    (0..glyph::GLYPH_COUNT)
                        .map(|id| glyph_quad(id, (240, 400), *window))
                        .collect::<Vec<_>>()
                })
            },
        );
        group.bench_with_input(
            format!("shader/{}x{}", window.0, window.1),
            window,
            |b, window| b.iter(|| image_vertex_shader(letterbox((1920, 1080), *window))),
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_rgba, benchmark_setup);
criterion_main!(benches);
