use codspeed_criterion_compat::{black_box, criterion_group, criterion_main, Criterion};
use padflow_control::{shape, AxisKind, ControlConfiguration, ControlKind};

fn shaped_config() -> ControlConfiguration {
    let mut cfg = ControlConfiguration::default();
    cfg.set_granularity(0.05).unwrap();
    cfg.set_dead_zone(-0.08, 0.08).unwrap();
    cfg.set_center(0.1).unwrap();
    cfg.set_inverted(true);
    cfg
}

pub fn bench_shape(c: &mut Criterion) {
    let plain = ControlConfiguration::default();
    let shaped = shaped_config();
    let kind = ControlKind::Continuous(AxisKind::Absolute);

    c.bench_function("shape_identity", |b| {
        b.iter(|| {
            for i in -128..128i32 {
                black_box(shape(black_box(i as f32 / 128.0), &plain, kind));
            }
        })
    });

    c.bench_function("shape_full_pipeline", |b| {
        b.iter(|| {
            for i in -128..128i32 {
                black_box(shape(black_box(i as f32 / 128.0), &shaped, kind));
            }
        })
    });
}

criterion_group!(benches, bench_shape);
criterion_main!(benches);
