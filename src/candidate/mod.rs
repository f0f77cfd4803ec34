//! Decoded candidates and greedy non-maximum suppression.

pub(crate) mod nms;

use crate::bbox::{BBox, Detection};
use crate::util::{YoloPostError, YoloPostResult};
use std::cmp::Ordering;

/// Flat decode output, one entry per (cell, anchor) pair.
///
/// The three vectors always have equal length; index `i` describes the same
/// candidate in each of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidates {
    boxes: Vec<BBox>,
    scores: Vec<f32>,
    classes: Vec<usize>,
}

impl Candidates {
    /// Creates empty candidates with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
            scores: Vec::with_capacity(capacity),
            classes: Vec::with_capacity(capacity),
        }
    }

    /// Builds candidates from parallel arrays of equal length.
    pub fn from_parts(
        boxes: Vec<BBox>,
        scores: Vec<f32>,
        classes: Vec<usize>,
    ) -> YoloPostResult<Self> {
        if boxes.len() != scores.len() {
            return Err(YoloPostError::ShapeMismatch {
                expected: boxes.len(),
                got: scores.len(),
            });
        }
        if boxes.len() != classes.len() {
            return Err(YoloPostError::ShapeMismatch {
                expected: boxes.len(),
                got: classes.len(),
            });
        }
        Ok(Self {
            boxes,
            scores,
            classes,
        })
    }

    /// Appends one candidate.
    pub fn push(&mut self, bbox: BBox, score: f32, class: usize) {
        self.boxes.push(bbox);
        self.scores.push(score);
        self.classes.push(class);
    }

    /// Returns the number of candidates.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true when there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Returns the decoded boxes.
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    /// Returns the best-class scores; zero when no class passed the threshold.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Returns the best-class indices.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Returns candidate `index` as a detection record.
    pub fn get(&self, index: usize) -> Option<Detection> {
        Some(Detection {
            bbox: *self.boxes.get(index)?,
            score: *self.scores.get(index)?,
            class: *self.classes.get(index)?,
        })
    }

    /// Splits into `(boxes, scores, classes)`.
    pub fn into_parts(self) -> (Vec<BBox>, Vec<f32>, Vec<usize>) {
        (self.boxes, self.scores, self.classes)
    }
}

/// Descending score, ascending index on ties.
pub(crate) fn rank_desc(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b))
}

/// Sorts candidate indices by descending score with deterministic ties.
pub(crate) fn sort_indices_desc(scores: &[f32], indices: &mut [usize]) {
    indices.sort_by(|&a, &b| rank_desc(scores, a, b));
}
