//! Grid decoding: raw logits to flat candidate arrays.
//!
//! Each (row, col, anchor) slot of the prediction tensor becomes one
//! candidate. Centers go through a sigmoid plus the cell offset, sizes through
//! `exp` scaled by the anchor, and the class score is `objectness × softmax`
//! reduced to its best class after the per-class threshold cut.

use crate::bbox::BBox;
use crate::candidate::Candidates;
use crate::config::{Config, NumericMode};
use crate::grid::{CellOffset, GridOffsets, OffsetCache, OffsetKey};
use crate::tensor::{PredictionBatch, PredictionTensor};
use crate::trace::{trace_event, trace_span};
use crate::util::math::{
    argmax_first, exp_clamped, sanitize_logit, sigmoid, softmax_into, LENIENT_BOX_LIMIT,
};
use crate::util::{YoloPostError, YoloPostResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::sync::Arc;

/// Decoder for one detector head configuration.
///
/// The decoder is immutable after construction and can be shared between
/// threads; every call allocates its own output.
#[derive(Clone, Debug)]
pub struct GridDecoder {
    cfg: Config,
    offsets: Arc<GridOffsets>,
}

impl GridDecoder {
    /// Creates a decoder with a private grid-offset table.
    pub fn new(cfg: Config) -> Self {
        let offsets = Arc::new(GridOffsets::new(OffsetKey::from_config(&cfg)));
        Self { cfg, offsets }
    }

    /// Creates a decoder whose offset table comes from `cache`.
    pub fn with_cache(cfg: Config, cache: &OffsetCache) -> Self {
        let offsets = cache.get_or_build(OffsetKey::from_config(&cfg));
        Self { cfg, offsets }
    }

    /// Returns the decoder configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the shared grid-offset table.
    pub fn offsets(&self) -> &Arc<GridOffsets> {
        &self.offsets
    }

    /// Decodes the output of a single image.
    ///
    /// In strict mode a non-finite input value, or a box size that overflows
    /// `f32`, fails with [`YoloPostError::NonFinite`] carrying the flat index
    /// of the offending value.
    pub fn decode(&self, tensor: PredictionTensor<'_>) -> YoloPostResult<Candidates> {
        self.check_dims(tensor.grid_size(), tensor.num_anchors(), tensor.channels())?;
        let _span = trace_span!("decode", cells = tensor.len()).entered();
        let candidates = self.decode_image(tensor, 0)?;
        trace_event!("decoded", candidates = candidates.len());
        Ok(candidates)
    }

    /// Decodes every image of a batch, in batch order.
    ///
    /// The batch may be smaller than the configured `batch_size` but not larger.
    /// `NonFinite` indices are positions in the whole batch buffer.
    pub fn decode_batch(&self, batch: PredictionBatch<'_>) -> YoloPostResult<Vec<Candidates>> {
        self.check_dims(batch.grid_size(), batch.num_anchors(), batch.channels())?;
        if batch.batch_size() > self.cfg.batch_size() {
            return Err(YoloPostError::DimensionMismatch {
                dim: "batch_size",
                expected: self.cfg.batch_size(),
                got: batch.batch_size(),
            });
        }
        let _span = trace_span!("decode_batch", images = batch.batch_size()).entered();

        #[cfg(feature = "rayon")]
        if self.cfg.parallel() {
            return self.decode_batch_par(batch);
        }

        (0..batch.batch_size())
            .map(|image| self.decode_image(batch.get(image)?, image))
            .collect()
    }

    /// Decodes the images of a batch in parallel (rayon).
    #[cfg(feature = "rayon")]
    fn decode_batch_par(&self, batch: PredictionBatch<'_>) -> YoloPostResult<Vec<Candidates>> {
        (0..batch.batch_size())
            .into_par_iter()
            .map(|image| self.decode_image(batch.get(image)?, image))
            .collect()
    }

    fn check_dims(
        &self,
        grid_size: usize,
        num_anchors: usize,
        channels: usize,
    ) -> YoloPostResult<()> {
        if grid_size != self.cfg.grid_size() {
            return Err(YoloPostError::DimensionMismatch {
                dim: "grid_size",
                expected: self.cfg.grid_size(),
                got: grid_size,
            });
        }
        if num_anchors != self.cfg.num_anchors() {
            return Err(YoloPostError::DimensionMismatch {
                dim: "num_anchors",
                expected: self.cfg.num_anchors(),
                got: num_anchors,
            });
        }
        if channels != self.cfg.channels() {
            return Err(YoloPostError::ChannelMismatch {
                expected: self.cfg.channels(),
                got: channels,
            });
        }
        Ok(())
    }

    fn decode_image(
        &self,
        tensor: PredictionTensor<'_>,
        image: usize,
    ) -> YoloPostResult<Candidates> {
        let offsets = self
            .offsets
            .for_image(image)
            .ok_or(YoloPostError::BatchIndexOutOfBounds {
                index: image,
                len: self.cfg.batch_size(),
            })?;

        let channels = self.cfg.channels();
        let base = image * tensor.as_slice().len();
        let lenient = match self.cfg.numeric_mode() {
            NumericMode::Strict => {
                if let Some(index) = tensor.as_slice().iter().position(|v| !v.is_finite()) {
                    return Err(YoloPostError::NonFinite {
                        index: base + index,
                    });
                }
                false
            }
            NumericMode::Lenient => true,
        };

        let mut out = Candidates::with_capacity(tensor.len());
        let mut sanitized = vec![0.0f32; channels];
        let mut class_scores = vec![0.0f32; self.cfg.num_classes()];

        for (slot, (raw, offset)) in tensor.cells().zip(offsets).enumerate() {
            let logits: &[f32] = if lenient {
                for (dst, &src) in sanitized.iter_mut().zip(raw) {
                    *dst = sanitize_logit(src);
                }
                &sanitized
            } else {
                raw
            };
            let anchor = slot % self.cfg.num_anchors();
            let bbox = self.decode_box(logits, *offset, anchor, lenient);
            if !bbox.is_finite() {
                // Finite logits can still overflow through a very large anchor.
                let channel = if bbox.width().is_finite() { 3 } else { 2 };
                return Err(YoloPostError::NonFinite {
                    index: base + slot * channels + channel,
                });
            }
            let (score, class) = self.decode_score(logits, &mut class_scores);
            out.push(bbox, score, class);
        }

        Ok(out)
    }

    /// Lenient decoding caps both sides at `LENIENT_BOX_LIMIT`.
    fn decode_box(&self, t: &[f32], offset: CellOffset, anchor: usize, lenient: bool) -> BBox {
        let grid = self.cfg.grid_size() as f32;
        let dims = self.cfg.anchors()[anchor];
        let cx = (sigmoid(t[0]) + offset.col) / grid;
        let cy = (sigmoid(t[1]) + offset.row) / grid;
        let mut w = exp_clamped(t[2]) * dims.width / grid;
        let mut h = exp_clamped(t[3]) * dims.height / grid;
        if lenient {
            w = w.min(LENIENT_BOX_LIMIT);
            h = h.min(LENIENT_BOX_LIMIT);
        }
        BBox::from_center(cx, cy, w, h)
    }

    /// Returns `(score, class)` for one slot; `scratch` holds class scores.
    fn decode_score(&self, t: &[f32], scratch: &mut [f32]) -> (f32, usize) {
        let threshold = self.cfg.detection_threshold();
        let objectness = sigmoid(t[4]);
        softmax_into(&t[5..], scratch);
        for score in scratch.iter_mut() {
            let combined = objectness * *score;
            *score = if combined > threshold { combined } else { 0.0 };
        }
        let (class, score) = argmax_first(scratch);
        (score, class)
    }
}
