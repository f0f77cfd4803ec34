//! Axis-aligned boxes and final detection records.

/// Box corners in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Creates a box from its corners.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from its center and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let half_w = w / 2.0;
        let half_h = h / 2.0;
        Self {
            x1: cx - half_w,
            y1: cy - half_h,
            x2: cx + half_w,
            y2: cy + half_h,
        }
    }

    /// Returns the width, zero when `x2 < x1`.
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Returns the height, zero when `y2 < y1`.
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Area, zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns true when every corner is finite.
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Intersection over union; zero when the boxes do not overlap.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = inter_w * inter_h;
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Returns the corners as `[x1, y1, x2, y2]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A detection that survived suppression and the final threshold check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    /// `objectness × class probability`, strictly above the detection threshold.
    pub score: f32,
    pub class: usize,
}
