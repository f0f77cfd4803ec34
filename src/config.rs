//! Immutable postprocessing configuration.
//!
//! A [`Config`] is built once through [`ConfigBuilder`], which validates every
//! value up front. Decoders and suppressors only ever see validated configs.

use crate::util::{YoloPostError, YoloPostResult};

/// Anchor box template in grid units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    /// Anchor width in grid cells.
    pub width: f32,
    /// Anchor height in grid cells.
    pub height: f32,
}

impl Anchor {
    /// Creates an anchor; validity is checked by [`ConfigBuilder::build`].
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Parses a comma-separated `w, h, w, h, ...` anchor list.
///
/// Whitespace and a trailing newline are ignored. An odd number of values or a
/// token that is not a number is rejected.
pub fn parse_anchors(text: &str) -> YoloPostResult<Vec<Anchor>> {
    let mut values = Vec::new();
    for token in text.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let value: f32 = token
            .parse()
            .map_err(|_| YoloPostError::InvalidAnchorList(format!("not a number: {token:?}")))?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(YoloPostError::InvalidAnchorList("no values".to_owned()));
    }
    if values.len() % 2 != 0 {
        return Err(YoloPostError::InvalidAnchorList(format!(
            "odd number of values ({})",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| Anchor::new(pair[0], pair[1]))
        .collect())
}

/// How non-finite values in the input tensor are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NumericMode {
    /// Fail with [`YoloPostError::NonFinite`].
    #[default]
    Strict,
    /// Replace NaN with zero and clamp infinities to a large finite logit.
    Lenient,
}

/// Validated postprocessing configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    grid_size: usize,
    anchors: Vec<Anchor>,
    num_classes: usize,
    detection_threshold: f32,
    nms_iou_threshold: f32,
    max_detections: usize,
    batch_size: usize,
    numeric_mode: NumericMode,
    parallel: bool,
}

impl Config {
    /// Starts a builder with default thresholds.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Grid cells along each side of the output grid.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Returns the anchors in channel order.
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Returns the number of anchors per cell.
    pub fn num_anchors(&self) -> usize {
        self.anchors.len()
    }

    /// Returns the number of class logits per anchor.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Channels per anchor: box (4), objectness (1) and class logits.
    pub fn channels(&self) -> usize {
        5 + self.num_classes
    }

    /// Number of (cell, anchor) pairs per image.
    pub fn cells_per_image(&self) -> usize {
        self.grid_size * self.grid_size * self.anchors.len()
    }

    /// Scores must be strictly above this value to be kept.
    pub fn detection_threshold(&self) -> f32 {
        self.detection_threshold
    }

    /// Overlaps strictly above this IoU are suppressed.
    pub fn nms_iou_threshold(&self) -> f32 {
        self.nms_iou_threshold
    }

    /// Returns the maximum number of detections per image.
    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    /// Returns the largest batch the decoder accepts.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns how non-finite input is handled.
    pub fn numeric_mode(&self) -> NumericMode {
        self.numeric_mode
    }

    /// Whether batch decoding and per-class suppression may use rayon.
    ///
    /// Has no effect unless the `rayon` feature is enabled.
    pub fn parallel(&self) -> bool {
        self.parallel
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    grid_size: usize,
    anchors: Vec<Anchor>,
    expected_anchors: Option<usize>,
    num_classes: usize,
    detection_threshold: f32,
    nms_iou_threshold: f32,
    max_detections: usize,
    batch_size: usize,
    numeric_mode: NumericMode,
    parallel: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            grid_size: 13,
            anchors: Vec::new(),
            expected_anchors: None,
            num_classes: 1,
            detection_threshold: 0.3,
            nms_iou_threshold: 0.5,
            max_detections: 50,
            batch_size: 1,
            numeric_mode: NumericMode::Strict,
            parallel: false,
        }
    }
}

impl ConfigBuilder {
    /// Sets the number of cells along each side of the grid.
    pub fn grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Sets the anchor list.
    pub fn anchors(mut self, anchors: Vec<Anchor>) -> Self {
        self.anchors = anchors;
        self
    }

    /// Declares the anchor count the model was trained with.
    ///
    /// When set, `build` rejects an anchor list of any other length.
    pub fn num_anchors(mut self, num_anchors: usize) -> Self {
        self.expected_anchors = Some(num_anchors);
        self
    }

    /// Sets the number of classes.
    pub fn num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Sets the score threshold, in `[0, 1]`.
    pub fn detection_threshold(mut self, threshold: f32) -> Self {
        self.detection_threshold = threshold;
        self
    }

    /// Sets the NMS overlap threshold, in `[0, 1]`.
    pub fn nms_iou_threshold(mut self, threshold: f32) -> Self {
        self.nms_iou_threshold = threshold;
        self
    }

    /// Sets the per-image detection cap.
    pub fn max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    /// Sets the batch size the offset table is built for.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the non-finite input policy.
    pub fn numeric_mode(mut self, mode: NumericMode) -> Self {
        self.numeric_mode = mode;
        self
    }

    /// Enables rayon paths when the `rayon` feature is compiled in.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates the values and returns the immutable config.
    pub fn build(self) -> YoloPostResult<Config> {
        if self.grid_size == 0 {
            return Err(YoloPostError::InvalidConfig("grid_size must be at least 1"));
        }
        if self.num_classes == 0 {
            return Err(YoloPostError::InvalidConfig("num_classes must be at least 1"));
        }
        if self.max_detections == 0 {
            return Err(YoloPostError::InvalidConfig(
                "max_detections must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(YoloPostError::InvalidConfig("batch_size must be at least 1"));
        }
        check_threshold("detection_threshold", self.detection_threshold)?;
        check_threshold("nms_iou_threshold", self.nms_iou_threshold)?;

        if let Some(expected) = self.expected_anchors {
            if expected != self.anchors.len() {
                return Err(YoloPostError::AnchorCountMismatch {
                    expected,
                    got: self.anchors.len(),
                });
            }
        }
        if self.anchors.is_empty() {
            return Err(YoloPostError::InvalidConfig("at least one anchor is required"));
        }
        if let Some(index) = self.anchors.iter().position(|a| !a.is_valid()) {
            return Err(YoloPostError::InvalidAnchor { index });
        }
        // grid² × anchors × channels × batch must be addressable.
        self.grid_size
            .checked_mul(self.grid_size)
            .and_then(|v| v.checked_mul(self.anchors.len()))
            .and_then(|v| v.checked_mul(self.num_classes.checked_add(5)?))
            .and_then(|v| v.checked_mul(self.batch_size))
            .ok_or(YoloPostError::InvalidConfig("tensor shape overflows usize"))?;

        Ok(Config {
            grid_size: self.grid_size,
            anchors: self.anchors,
            num_classes: self.num_classes,
            detection_threshold: self.detection_threshold,
            nms_iou_threshold: self.nms_iou_threshold,
            max_detections: self.max_detections,
            batch_size: self.batch_size,
            numeric_mode: self.numeric_mode,
            parallel: self.parallel,
        })
    }
}

fn check_threshold(name: &'static str, value: f32) -> YoloPostResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(YoloPostError::InvalidThreshold { name, value })
    }
}
