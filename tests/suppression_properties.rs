use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use yolopost::{Anchor, BBox, Candidates, Config, Detection, SuppressionStrategy, Suppressor};

fn suppressor(detection_threshold: f32, iou_threshold: f32, max_detections: usize) -> Suppressor {
    let cfg = Config::builder()
        .grid_size(13)
        .anchors(vec![Anchor::new(1.0, 1.0)])
        .num_classes(4)
        .detection_threshold(detection_threshold)
        .nms_iou_threshold(iou_threshold)
        .max_detections(max_detections)
        .build()
        .unwrap();
    Suppressor::new(cfg)
}

fn random_candidates(rng: &mut StdRng, count: usize, classes: usize) -> Candidates {
    let mut out = Candidates::with_capacity(count);
    for _ in 0..count {
        let cx: f32 = rng.random_range(0.0..1.0);
        let cy: f32 = rng.random_range(0.0..1.0);
        let w: f32 = rng.random_range(0.02..0.3);
        let h: f32 = rng.random_range(0.02..0.3);
        let score: f32 = rng.random_range(0.0..1.0);
        let class = rng.random_range(0..classes);
        out.push(BBox::from_center(cx, cy, w, h), score, class);
    }
    out
}

fn assert_no_overlap_above(detections: &[Detection], iou_threshold: f32) {
    for (i, a) in detections.iter().enumerate() {
        for b in detections.iter().skip(i + 1) {
            assert!(a.bbox.iou(&b.bbox) <= iou_threshold);
        }
    }
}

#[test]
fn identical_boxes_keep_only_the_higher_score() {
    let bbox = BBox::new(0.2, 0.2, 0.6, 0.6);
    let candidates =
        Candidates::from_parts(vec![bbox, bbox], vec![0.9, 0.6], vec![0, 0]).unwrap();
    for strategy in [SuppressionStrategy::Global, SuppressionStrategy::PerClass] {
        let kept = suppressor(0.3, 0.5, 10).suppress(&candidates, strategy);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.9);
    }
}

#[test]
fn per_class_keeps_overlapping_objects_of_different_classes() {
    let bbox = BBox::new(0.1, 0.1, 0.5, 0.5);
    let candidates =
        Candidates::from_parts(vec![bbox, bbox], vec![0.9, 0.8], vec![0, 1]).unwrap();
    let sup = suppressor(0.3, 0.5, 10);

    let global = sup.suppress(&candidates, SuppressionStrategy::Global);
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].class, 0);

    let per_class = sup.suppress(&candidates, SuppressionStrategy::PerClass);
    assert_eq!(per_class.len(), 2);
    assert_eq!(per_class[0].class, 0);
    assert_eq!(per_class[1].class, 1);
}

#[test]
fn per_class_output_is_grouped_by_class() {
    let boxes = vec![
        BBox::new(0.0, 0.0, 0.1, 0.1),
        BBox::new(0.2, 0.0, 0.3, 0.1),
        BBox::new(0.4, 0.0, 0.5, 0.1),
        BBox::new(0.6, 0.0, 0.7, 0.1),
    ];
    let candidates =
        Candidates::from_parts(boxes, vec![0.4, 0.95, 0.8, 0.6], vec![2, 0, 2, 1]).unwrap();
    let kept = suppressor(0.3, 0.5, 10).suppress_indices(&candidates, SuppressionStrategy::PerClass);
    assert_eq!(kept, vec![1, 3, 2, 0]);

    let kept = suppressor(0.3, 0.5, 10).suppress_indices(&candidates, SuppressionStrategy::Global);
    assert_eq!(kept, vec![1, 2, 3, 0]);
}

#[test]
fn per_class_cap_drops_lowest_scores_and_keeps_class_order() {
    let boxes = vec![
        BBox::new(0.0, 0.0, 0.1, 0.1),
        BBox::new(0.3, 0.3, 0.4, 0.4),
        BBox::new(0.6, 0.6, 0.7, 0.7),
    ];
    let candidates = Candidates::from_parts(boxes, vec![0.5, 0.9, 0.7], vec![0, 1, 2]).unwrap();
    let kept = suppressor(0.3, 0.5, 2).suppress(&candidates, SuppressionStrategy::PerClass);
    let classes: Vec<usize> = kept.iter().map(|d| d.class).collect();
    assert_eq!(classes, vec![1, 2]);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.7);
}

#[test]
fn scores_at_threshold_never_survive() {
    let boxes = vec![BBox::new(0.0, 0.0, 0.1, 0.1), BBox::new(0.5, 0.5, 0.6, 0.6)];
    let candidates = Candidates::from_parts(boxes, vec![0.3, 0.31], vec![0, 0]).unwrap();
    let kept = suppressor(0.3, 0.5, 10).suppress(&candidates, SuppressionStrategy::Global);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.31);
}

#[test]
fn empty_input_yields_empty_output() {
    let candidates = Candidates::default();
    for strategy in [SuppressionStrategy::Global, SuppressionStrategy::PerClass] {
        assert!(suppressor(0.3, 0.5, 10)
            .suppress(&candidates, strategy)
            .is_empty());
    }
}

#[test]
fn randomized_global_nms_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0001);
    for _ in 0..20 {
        let candidates = random_candidates(&mut rng, 300, 4);
        let sup = suppressor(0.2, 0.45, 25);
        let kept = sup.suppress(&candidates, SuppressionStrategy::Global);

        assert!(kept.len() <= 25);
        assert!(kept.iter().all(|d| d.score > 0.2));
        assert_no_overlap_above(&kept, 0.45);
        for pair in kept.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(kept, sup.suppress(&candidates, SuppressionStrategy::Global));
    }
}

#[test]
fn randomized_per_class_nms_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0002);
    for _ in 0..20 {
        let candidates = random_candidates(&mut rng, 300, 4);
        let sup = suppressor(0.2, 0.45, 40);
        let kept = sup.suppress(&candidates, SuppressionStrategy::PerClass);

        let eligible = candidates.scores().iter().filter(|&&s| s > 0.2).count();
        assert!(kept.len() <= eligible);
        assert!(kept.len() <= 40);
        assert!(kept.iter().all(|d| d.score > 0.2));
        for pair in kept.windows(2) {
            assert!(pair[0].class <= pair[1].class);
        }
        for class in 0..4 {
            let group: Vec<Detection> = kept.iter().copied().filter(|d| d.class == class).collect();
            assert_no_overlap_above(&group, 0.45);
        }
        assert_eq!(kept, sup.suppress(&candidates, SuppressionStrategy::PerClass));
    }
}

#[test]
fn max_detections_bounds_both_strategies() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0003);
    let candidates = random_candidates(&mut rng, 500, 3);
    for max in [1usize, 3, 7] {
        let sup = suppressor(0.0, 0.9, max);
        for strategy in [SuppressionStrategy::Global, SuppressionStrategy::PerClass] {
            assert!(sup.suppress(&candidates, strategy).len() <= max);
        }
    }
}

#[test]
fn overlap_equal_to_the_iou_threshold_is_kept() {
    let boxes = vec![BBox::new(0.0, 0.0, 1.0, 1.0), BBox::new(0.0, 0.0, 1.0, 0.5)];
    assert_eq!(boxes[0].iou(&boxes[1]), 0.5);
    let candidates = Candidates::from_parts(boxes, vec![0.9, 0.8], vec![0, 0]).unwrap();
    for strategy in [SuppressionStrategy::Global, SuppressionStrategy::PerClass] {
        let kept = suppressor(0.3, 0.5, 10).suppress_indices(&candidates, strategy);
        assert_eq!(kept, vec![0, 1]);
    }
}
