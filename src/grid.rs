//! Precomputed grid offsets.
//!
//! Every (row, col, anchor) slot of the output grid adds its cell coordinates
//! to the decoded center. The table is built once per
//! `(grid_size, num_anchors, batch_size)` key and shared read-only through an
//! `Arc`; [`OffsetCache`] hands out the same table to every decoder built for
//! a matching key.

use crate::config::Config;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cell coordinates broadcast to one (row, col, anchor) slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellOffset {
    /// Column of the cell (x offset).
    pub col: f32,
    /// Row of the cell (y offset).
    pub row: f32,
}

/// Key identifying a grid-offset table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OffsetKey {
    /// Cells along each side of the grid.
    pub grid_size: usize,
    /// Anchors per cell.
    pub num_anchors: usize,
    /// Images covered by the table.
    pub batch_size: usize,
}

impl OffsetKey {
    /// Returns the key matching a validated config.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            grid_size: cfg.grid_size(),
            num_anchors: cfg.num_anchors(),
            batch_size: cfg.batch_size(),
        }
    }
}

/// Grid offsets tiled over every image of a batch.
#[derive(Debug)]
pub struct GridOffsets {
    key: OffsetKey,
    per_image: usize,
    offsets: Vec<CellOffset>,
}

impl GridOffsets {
    /// Builds the table for `key`.
    ///
    /// Keys taken from a validated [`Config`] never overflow the table size.
    pub fn new(key: OffsetKey) -> Self {
        let g = key.grid_size;
        let per_image = g * g * key.num_anchors;
        let mut offsets = Vec::with_capacity(per_image * key.batch_size);
        for _ in 0..key.batch_size {
            for row in 0..g {
                for col in 0..g {
                    let offset = CellOffset {
                        col: col as f32,
                        row: row as f32,
                    };
                    offsets.extend(std::iter::repeat(offset).take(key.num_anchors));
                }
            }
        }
        Self {
            key,
            per_image,
            offsets,
        }
    }

    /// Returns the key the table was built for.
    pub fn key(&self) -> OffsetKey {
        self.key
    }

    /// Offsets for one image, in flat (row, col, anchor) order.
    ///
    /// Returns `None` when `image` is outside the batch.
    pub fn for_image(&self, image: usize) -> Option<&[CellOffset]> {
        let start = image.checked_mul(self.per_image)?;
        self.offsets.get(start..start + self.per_image)
    }
}

/// Thread-safe cache of grid-offset tables.
#[derive(Debug, Default)]
pub struct OffsetCache {
    tables: RwLock<HashMap<OffsetKey, Arc<GridOffsets>>>,
}

impl OffsetCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table for `key`, building it on first use.
    pub fn get_or_build(&self, key: OffsetKey) -> Arc<GridOffsets> {
        if let Ok(tables) = self.tables.read() {
            if let Some(table) = tables.get(&key) {
                return Arc::clone(table);
            }
        }
        let mut tables = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            tables
                .entry(key)
                .or_insert_with(|| Arc::new(GridOffsets::new(key))),
        )
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        match self.tables.read() {
            Ok(tables) => tables.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true when no table has been built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
