//! Performance benchmarks for map-insights-lib
//!
//! Run with: cargo bench --package map-insights-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Geometry, LineString, Point, polygon};
use map_insights_lib::{
    AttributeCounter, AttributeValue, BoundingBox, CoordinateSpace, CounterId, Layer, LayerId,
    Properties, SpatialIndex, aggregate, build_scale, viewport_to_bounds, ViewState,
};

const STATUSES: [&str; 4] = ["open", "closed", "pending", "unknown"];

/// Generate a layer mixing points, lines and polygons scattered around a city-sized area
fn generate_layer(id: u64, count: usize, base_lon: f64, base_lat: f64) -> Layer {
    let items = (0..count).map(|i| {
        let t = i as f64 / count as f64;
        let lon = base_lon + (t * 977.0).sin() * 0.5;
        let lat = base_lat + (t * 613.0).cos() * 0.5;
        let geometry: Geometry<f64> = match i % 3 {
            0 => Point::new(lon, lat).into(),
            1 => LineString::from(vec![(lon, lat), (lon + 0.01, lat + 0.005), (lon + 0.02, lat)])
                .into(),
            _ => polygon![
                (x: lon, y: lat),
                (x: lon + 0.005, y: lat),
                (x: lon + 0.005, y: lat + 0.005),
                (x: lon, y: lat + 0.005),
            ]
            .into(),
        };
        let props: Properties = [
            ("status", AttributeValue::from(STATUSES[i % STATUSES.len()])),
            ("value", AttributeValue::Number((i % 100) as f64)),
        ]
        .into_iter()
        .collect();
        (geometry, props)
    });
    Layer::from_geometries(LayerId(id), format!("layer {id}"), CoordinateSpace::Geographic, items)
}

fn status_counter(layer_id: u64) -> AttributeCounter {
    AttributeCounter {
        id: CounterId(layer_id),
        layer_id: LayerId(layer_id),
        attribute: "status".to_string(),
    }
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    group.sample_size(20);

    for size in [10_000, 100_000] {
        let layers = vec![generate_layer(1, size, -0.1, 51.5)];
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("index_build", size), &layers, |b, layers| {
            b.iter(|| SpatialIndex::from_layers(layers));
        });
    }

    group.finish();
}

fn bench_query_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let layers = vec![generate_layer(1, 100_000, -0.1, 51.5)];
    let index = SpatialIndex::from_layers(&layers);

    // Street-level view
    let small_viewport = BoundingBox::new(-0.12, 51.49, -0.08, 51.51);
    group.bench_function("small_viewport_100k", |b| {
        b.iter(|| index.query(&small_viewport).len());
    });

    // City overview
    let large_viewport = BoundingBox::new(-1.0, 51.0, 1.0, 52.0);
    group.bench_function("large_viewport_100k", |b| {
        b.iter(|| index.query(&large_viewport).len());
    });

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    group.sample_size(20);

    let layers: Vec<Layer> = (0..5)
        .map(|i| generate_layer(i + 1, 20_000, -0.1 + i as f64 * 0.2, 51.5))
        .collect();
    let index = SpatialIndex::from_layers(&layers);
    let counters: Vec<AttributeCounter> = (1..=5).map(status_counter).collect();

    let view = ViewState::new(0.3, 51.5, 9.0, 1920.0, 1080.0).with_pitch(45.0);
    let viewport = match viewport_to_bounds(&view) {
        Ok(viewport) => viewport,
        Err(e) => panic!("benchmark view state rejected: {e}"),
    };

    group.throughput(Throughput::Elements(100_000));
    group.bench_function("5_layers_20k_with_counters", |b| {
        b.iter(|| aggregate(&index, &viewport, &layers, &counters));
    });
    group.bench_function("5_layers_20k_no_counters", |b| {
        b.iter(|| aggregate(&index, &viewport, &layers, &[]));
    });

    group.finish();
}

fn bench_color_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_scale");

    let layer = generate_layer(1, 50_000, -0.1, 51.5);
    let numeric = layer.attribute_values("value");
    let categorical = layer.attribute_values("status");

    group.bench_function("continuous_50k", |b| {
        b.iter(|| build_scale(&numeric, "viridis"));
    });
    group.bench_function("categorical_50k", |b| {
        b.iter(|| build_scale(&categorical, "category10"));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_construction,
    bench_query_performance,
    bench_aggregation,
    bench_color_scale,
);

criterion_main!(benches);
