//! Borrowed views over raw detector output.
//!
//! `PredictionTensor` views one image's output as a row-major
//! `(row, col, anchor, channel)` array over a contiguous `f32` slice.
//! `PredictionBatch` adds a leading batch dimension; per-image views are
//! zero-copy sub-slices of the same buffer.

use crate::util::{YoloPostError, YoloPostResult};

/// Borrowed rank-4 prediction tensor for a single image.
#[derive(Copy, Clone, Debug)]
pub struct PredictionTensor<'a> {
    data: &'a [f32],
    grid_size: usize,
    num_anchors: usize,
    channels: usize,
}

impl<'a> PredictionTensor<'a> {
    /// Creates a view; `data.len()` must equal `grid² × anchors × channels`.
    pub fn new(
        data: &'a [f32],
        grid_size: usize,
        num_anchors: usize,
        channels: usize,
    ) -> YoloPostResult<Self> {
        let expected = image_len(grid_size, num_anchors, channels)?;
        if data.len() != expected {
            return Err(YoloPostError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            grid_size,
            num_anchors,
            channels,
        })
    }

    /// Returns the number of cells along each side.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Returns the number of anchors per cell.
    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    /// Returns the number of channels per anchor.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the backing slice.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Number of (cell, anchor) pairs.
    pub fn len(&self) -> usize {
        self.grid_size * self.grid_size * self.num_anchors
    }

    /// Returns true when the tensor has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the channel vector of one cell/anchor pair.
    pub fn cell(&self, row: usize, col: usize, anchor: usize) -> Option<&'a [f32]> {
        if row >= self.grid_size || col >= self.grid_size || anchor >= self.num_anchors {
            return None;
        }
        self.flat(((row * self.grid_size) + col) * self.num_anchors + anchor)
    }

    /// Returns the channel vector at a flat (row, col, anchor) index.
    pub fn flat(&self, index: usize) -> Option<&'a [f32]> {
        let start = index.checked_mul(self.channels)?;
        let end = start.checked_add(self.channels)?;
        self.data.get(start..end)
    }

    /// Iterates channel vectors in flat (row, col, anchor) order.
    pub fn cells(&self) -> std::slice::ChunksExact<'a, f32> {
        self.data.chunks_exact(self.channels)
    }
}

/// Borrowed rank-5 tensor holding the outputs of a whole batch.
#[derive(Copy, Clone, Debug)]
pub struct PredictionBatch<'a> {
    data: &'a [f32],
    batch_size: usize,
    image_len: usize,
    grid_size: usize,
    num_anchors: usize,
    channels: usize,
}

impl<'a> PredictionBatch<'a> {
    /// Creates a batch view; `data.len()` must be `batch × per-image length`.
    pub fn new(
        data: &'a [f32],
        batch_size: usize,
        grid_size: usize,
        num_anchors: usize,
        channels: usize,
    ) -> YoloPostResult<Self> {
        if batch_size == 0 {
            return Err(YoloPostError::InvalidConfig("batch_size must be at least 1"));
        }
        let image_len = image_len(grid_size, num_anchors, channels)?;
        let expected = image_len
            .checked_mul(batch_size)
            .ok_or(YoloPostError::InvalidConfig("tensor shape overflows usize"))?;
        if data.len() != expected {
            return Err(YoloPostError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            batch_size,
            image_len,
            grid_size,
            num_anchors,
            channels,
        })
    }

    /// Infers the batch size from the buffer length.
    pub fn from_slice(
        data: &'a [f32],
        grid_size: usize,
        num_anchors: usize,
        channels: usize,
    ) -> YoloPostResult<Self> {
        let image_len = image_len(grid_size, num_anchors, channels)?;
        if data.is_empty() || data.len() % image_len != 0 {
            return Err(YoloPostError::ShapeMismatch {
                expected: image_len,
                got: data.len(),
            });
        }
        Self::new(
            data,
            data.len() / image_len,
            grid_size,
            num_anchors,
            channels,
        )
    }

    /// Returns the number of images in the batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the number of cells along each side.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Returns the number of anchors per cell.
    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    /// Returns the number of channels per anchor.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the tensor of image `index`.
    pub fn get(&self, index: usize) -> YoloPostResult<PredictionTensor<'a>> {
        if index >= self.batch_size {
            return Err(YoloPostError::BatchIndexOutOfBounds {
                index,
                len: self.batch_size,
            });
        }
        let start = index * self.image_len;
        PredictionTensor::new(
            &self.data[start..start + self.image_len],
            self.grid_size,
            self.num_anchors,
            self.channels,
        )
    }
}

fn image_len(grid_size: usize, num_anchors: usize, channels: usize) -> YoloPostResult<usize> {
    if grid_size == 0 {
        return Err(YoloPostError::InvalidConfig("grid_size must be at least 1"));
    }
    if num_anchors == 0 {
        return Err(YoloPostError::InvalidConfig("num_anchors must be at least 1"));
    }
    if channels < 6 {
        return Err(YoloPostError::ChannelMismatch {
            expected: 6,
            got: channels,
        });
    }
    grid_size
        .checked_mul(grid_size)
        .and_then(|v| v.checked_mul(num_anchors))
        .and_then(|v| v.checked_mul(channels))
        .ok_or(YoloPostError::InvalidConfig("tensor shape overflows usize"))
}
