use std::hash::Hash;

use crate::grid::grid_constants::DIMENSION;

/// An axis-aligned 2D rectangle used both as the shape of indexed data and as
/// the region covered by a grid node.
///
/// Axis 0 is the X axis and axis 1 is the Y axis, so `low(0)` is `min_x` and
/// `high(1)` is `max_y`. Boundaries are closed: two boxes that only touch on an
/// edge or a corner still intersect.
///
/// # Examples
///
/// ```rust
/// use nitrite_grid::BoundingBox;
///
/// let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
/// let shape = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
///
/// assert!(region.contains(&shape));
/// assert_eq!(region.low(0), 0.0);
/// assert_eq!(region.high(1), 100.0);
/// ```
#[derive(Clone, Copy, Default, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

// Equality is by bit pattern so that it agrees with `Hash`. Signed zeros are
// folded together first.
impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Eq for BoundingBox {}

impl PartialOrd for BoundingBox {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundingBox {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let [a, b] = [self.to_array(), other.to_array()].map(|c| c.map(unsigned_zero));
        a[0].total_cmp(&b[0])
            .then(a[1].total_cmp(&b[1]))
            .then(a[2].total_cmp(&b[2]))
            .then(a[3].total_cmp(&b[3]))
    }
}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundingBox({}, {}, {}, {})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl BoundingBox {
    /// Creates a new bounding box from its minimum and maximum corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Number of axes. Always 2.
    #[inline]
    pub fn dimension(&self) -> usize {
        DIMENSION
    }

    /// Lower coordinate on `axis` (0 = X, 1 = Y).
    ///
    /// # Panics
    ///
    /// Panics if `axis >= 2`.
    #[inline]
    pub fn low(&self, axis: usize) -> f64 {
        match axis {
            0 => self.min_x,
            1 => self.min_y,
            _ => panic!("axis {} out of range for a 2D bounding box", axis),
        }
    }

    /// Upper coordinate on `axis` (0 = X, 1 = Y).
    ///
    /// # Panics
    ///
    /// Panics if `axis >= 2`.
    #[inline]
    pub fn high(&self, axis: usize) -> f64 {
        match axis {
            0 => self.max_x,
            1 => self.max_y,
            _ => panic!("axis {} out of range for a 2D bounding box", axis),
        }
    }

    /// Extent along `axis`.
    #[inline]
    pub fn extent(&self, axis: usize) -> f64 {
        self.high(axis) - self.low(axis)
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Checks if this bounding box contains another bounding box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x && other.max_x <= self.max_x
            && other.min_y >= self.min_y && other.max_y <= self.max_y
    }

    /// Checks if this bounding box intersects another bounding box.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x && self.max_x >= other.min_x
            && self.min_y <= other.max_y && self.max_y >= other.min_y
    }

    /// Checks if this bounding box is valid (finite coordinates, min <= max).
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Checks if this bounding box has a positive extent on every axis.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Coordinates as `[min_x, min_y, max_x, max_y]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Bit patterns of the coordinates, in [`to_array`](Self::to_array) order.
    ///
    /// `-0.0` maps to the bits of `0.0`.
    pub fn to_bits(&self) -> [u64; 4] {
        self.to_array().map(|c| unsigned_zero(c).to_bits())
    }

    /// Rebuilds a bounding box from [`to_bits`](Self::to_bits) output.
    pub fn from_bits(bits: [u64; 4]) -> BoundingBox {
        let [min_x, min_y, max_x, max_y] = bits.map(f64::from_bits);
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}

fn unsigned_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}
