//! End-to-end tests on synthetic detector output with planted objects.

use yolopost::{
    Anchor, Config, Detection, OffsetCache, Pipeline, PredictionBatch, PredictionTensor,
    SuppressionStrategy,
};

const GRID: usize = 4;
const CLASSES: usize = 3;
const CHANNELS: usize = 5 + CLASSES;

fn anchors() -> Vec<Anchor> {
    vec![Anchor::new(1.0, 1.0), Anchor::new(1.2, 1.2)]
}

fn config(batch_size: usize) -> Config {
    Config::builder()
        .grid_size(GRID)
        .anchors(anchors())
        .num_anchors(2)
        .num_classes(CLASSES)
        .detection_threshold(0.3)
        .nms_iou_threshold(0.5)
        .max_detections(10)
        .batch_size(batch_size)
        .build()
        .unwrap()
}

/// Background everywhere: objectness logit -8.
fn background() -> Vec<f32> {
    let mut data = vec![0.0f32; GRID * GRID * 2 * CHANNELS];
    for cell in data.chunks_exact_mut(CHANNELS) {
        cell[4] = -8.0;
    }
    data
}

fn plant(data: &mut [f32], row: usize, col: usize, anchor: usize, objectness: f32, class: usize) {
    let base = ((row * GRID + col) * 2 + anchor) * CHANNELS;
    data[base + 4] = objectness;
    data[base + 5 + class] = 5.0;
}

/// Two objects, one of them with a duplicate on the second anchor.
fn scene() -> Vec<f32> {
    let mut data = background();
    plant(&mut data, 1, 2, 0, 6.0, 2);
    plant(&mut data, 1, 2, 1, 4.0, 2);
    plant(&mut data, 3, 0, 1, 5.0, 0);
    data
}

fn assert_box(det: &Detection, expected: [f32; 4]) {
    for (got, want) in det.bbox.to_array().iter().zip(expected) {
        assert!((got - want).abs() < 1e-5, "got {got}, want {want}");
    }
}

#[test]
fn planted_objects_are_recovered_per_class() {
    let data = scene();
    let tensor = PredictionTensor::new(&data, GRID, 2, CHANNELS).unwrap();
    let detections = Pipeline::new(config(1)).run(tensor).unwrap();

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class, 0);
    assert_eq!(detections[1].class, 2);
    assert!(detections.iter().all(|d| d.score > 0.9));

    // Anchor 1 (1.2 × 1.2 cells) centered in cell (row 3, col 0).
    assert_box(&detections[0], [0.125 - 0.15, 0.875 - 0.15, 0.125 + 0.15, 0.875 + 0.15]);
    // Anchor 0 (1 × 1 cell) centered in cell (row 1, col 2).
    assert_box(&detections[1], [0.5, 0.25, 0.75, 0.5]);
}

#[test]
fn global_strategy_orders_by_score() {
    let data = scene();
    let tensor = PredictionTensor::new(&data, GRID, 2, CHANNELS).unwrap();
    let detections = Pipeline::new(config(1))
        .with_strategy(SuppressionStrategy::Global)
        .run(tensor)
        .unwrap();

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class, 2);
    assert_eq!(detections[1].class, 0);
    assert!(detections[0].score > detections[1].score);
}

#[test]
fn background_only_yields_no_detections() {
    let data = background();
    let tensor = PredictionTensor::new(&data, GRID, 2, CHANNELS).unwrap();
    assert!(Pipeline::new(config(1)).run(tensor).unwrap().is_empty());
}

#[test]
fn batch_run_handles_each_image_independently() {
    let mut data = scene();
    data.extend(background());
    data.extend(scene());
    let batch = PredictionBatch::from_slice(&data, GRID, 2, CHANNELS).unwrap();

    let cache = OffsetCache::new();
    let pipeline = Pipeline::with_cache(config(3), &cache);
    let results = pipeline.run_batch(batch).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].len(), 2);
    assert!(results[1].is_empty());
    assert_eq!(results[0], results[2]);
    assert_eq!(cache.len(), 1);
}

#[test]
fn repeated_runs_are_identical() {
    let data = scene();
    let tensor = PredictionTensor::new(&data, GRID, 2, CHANNELS).unwrap();
    let pipeline = Pipeline::new(config(1));
    let first = pipeline.run(tensor).unwrap();
    for _ in 0..5 {
        assert_eq!(pipeline.run(tensor).unwrap(), first);
    }
}
