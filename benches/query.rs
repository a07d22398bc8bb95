use criterion::{black_box, criterion_group, criterion_main, Criterion};
use osm_text2coord::test_helpers::WorldBuilder;
use osm_text2coord::Category;

fn query_benchmark(c: &mut Criterion) {
    let mut builder = WorldBuilder::new()
        .named_node(1, 14.16, 57.78, "Jönköping", Category::PlaceLarge)
        .node(2, 14.10, 57.75)
        .node(3, 14.20, 57.80)
        .road_way(10, &[2, 3], "E 4");
    // Pad the name index with surrounding villages.
    for i in 0..500 {
        let lon = 13.0 + f64::from(i % 50) * 0.02;
        let lat = 57.0 + f64::from(i / 50) * 0.05;
        builder = builder.named_node(
            1_000 + i64::from(i),
            lon,
            lat,
            &format!("Byn {}", i),
            Category::PlaceSmall,
        );
    }
    let world = builder.build();

    c.bench_function("find road near place", |b| {
        b.iter(|| world.find_results(black_box("E4 nära Jönköping"), 250, 20))
    });
    c.bench_function("find unknown name", |b| {
        b.iter(|| world.find_results(black_box("ingenstans alls"), 250, 20))
    });
}

criterion_group!(benches, query_benchmark);
criterion_main!(benches);
