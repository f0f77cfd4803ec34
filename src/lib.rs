//! yolopost decodes the raw output grid of a YOLO-style detector and prunes
//! it with non-maximum suppression.
//!
//! A [`GridDecoder`] turns a `grid × grid × anchors × (5 + classes)` logit
//! tensor into one candidate box per (cell, anchor) slot. A [`Suppressor`]
//! then removes overlapping candidates either globally or per class and
//! re-checks the detection threshold. [`Pipeline`] chains both steps.
//!
//! Batch decoding and per-class suppression can run on rayon when the
//! `rayon` feature is enabled and [`Config::parallel`] is set.

pub mod bbox;
mod candidate;
pub mod config;
pub mod decode;
pub mod grid;
pub mod pipeline;
pub mod suppress;
pub mod tensor;
mod trace;
pub mod util;

pub use bbox::{BBox, Detection};
pub use candidate::Candidates;
pub use config::{parse_anchors, Anchor, Config, ConfigBuilder, NumericMode};
pub use decode::GridDecoder;
pub use grid::{CellOffset, GridOffsets, OffsetCache, OffsetKey};
pub use pipeline::Pipeline;
pub use suppress::{SuppressionStrategy, Suppressor};
pub use tensor::{PredictionBatch, PredictionTensor};
pub use util::{YoloPostError, YoloPostResult};
