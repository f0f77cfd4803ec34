//! Greedy IoU-based non-maximum suppression.

use crate::bbox::BBox;
use crate::candidate::sort_indices_desc;

/// Runs greedy NMS over `indices` and returns the kept indices.
///
/// Indices are visited by descending score (ties by ascending index). A
/// candidate is kept unless its IoU with an already kept box exceeds
/// `iou_threshold`. At most `max_keep` indices are returned, in keep order.
pub(crate) fn greedy_nms(
    boxes: &[BBox],
    scores: &[f32],
    indices: &mut [usize],
    iou_threshold: f32,
    max_keep: usize,
) -> Vec<usize> {
    if max_keep == 0 || indices.is_empty() {
        return Vec::new();
    }

    sort_indices_desc(scores, indices);
    let mut kept: Vec<usize> = Vec::with_capacity(max_keep.min(indices.len()));

    'outer: for &idx in indices.iter() {
        let candidate = &boxes[idx];
        for &kept_idx in kept.iter() {
            if candidate.iou(&boxes[kept_idx]) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(idx);
        if kept.len() == max_keep {
            break;
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::greedy_nms;
    use crate::bbox::BBox;

    #[test]
    fn keeps_highest_of_identical_boxes() {
        let b = BBox::new(0.1, 0.1, 0.4, 0.4);
        let boxes = [b, b];
        let scores = [0.6, 0.9];
        let mut indices = vec![0, 1];
        assert_eq!(greedy_nms(&boxes, &scores, &mut indices, 0.5, 10), vec![1]);
    }

    #[test]
    fn threshold_controls_which_overlaps_survive() {
        let a = BBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BBox::new(1.0, 0.0, 3.0, 2.0);
        let boxes = [a, b];
        let scores = [0.9, 0.8];
        // IoU is exactly 1/3.
        let mut indices = vec![0, 1];
        let kept = greedy_nms(&boxes, &scores, &mut indices, 0.5, 10);
        assert_eq!(kept, vec![0, 1]);
        let mut indices = vec![0, 1];
        let kept = greedy_nms(&boxes, &scores, &mut indices, 0.3, 10);
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn equal_scores_resolve_by_index() {
        let b = BBox::new(0.2, 0.2, 0.6, 0.6);
        let boxes = [b, b, b];
        let scores = [0.7, 0.7, 0.7];
        let mut indices = vec![2, 0, 1];
        assert_eq!(greedy_nms(&boxes, &scores, &mut indices, 0.5, 10), vec![0]);
    }

    #[test]
    fn stops_at_max_keep() {
        let boxes: Vec<BBox> = (0..5)
            .map(|i| {
                let x = i as f32 * 0.2;
                BBox::new(x, 0.0, x + 0.1, 0.1)
            })
            .collect();
        let scores = [0.5, 0.9, 0.3, 0.8, 0.7];
        let mut indices: Vec<usize> = (0..5).collect();
        assert_eq!(
            greedy_nms(&boxes, &scores, &mut indices, 0.5, 3),
            vec![1, 3, 4]
        );
    }
}
