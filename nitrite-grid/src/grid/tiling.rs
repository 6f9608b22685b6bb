//! Tile arithmetic: tiling parameters, the tile index range covered by a
//! shape, and the flattening of per-axis tile indices into child slots.
//!
//! Tiles are always enumerated in row-major order with axis 0 varying
//! fastest. `split`, [`TileRange`] and [`Tiling::flat_index`] all share this
//! order, so the child list written at construction can be recovered from
//! storage and indexed without renumbering.

use crate::bounding_box::BoundingBox;
use crate::grid::grid_config::GridConfig;
use crate::grid::grid_constants::{DIMENSION, TILE_EPSILON};
use crate::grid::grid_types::{GridError, GridResult, NodeKey, RootNode};

/// Per-axis tile index.
pub type TileIndex = [usize; DIMENSION];

/// Tiling parameters of a grid. Immutable once the grid is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiling {
    region: BoundingBox,
    requested_capacity: usize,
    tiles_per_axis: TileIndex,
    tile_edge: f64,
    children: Vec<NodeKey>,
}

impl Tiling {
    /// Computes the tiling of `region` into at least `capacity` square tiles.
    ///
    /// The tile edge is `(area / capacity)^(1/2)` and each axis gets
    /// `ceil(extent / edge)` tiles, so the actual capacity may exceed the
    /// requested one.
    pub fn compute(region: BoundingBox, capacity: usize) -> GridResult<Self> {
        GridConfig::new(region, capacity).validate()?;

        let tile_edge = (region.area() / capacity as f64).powf(1.0 / DIMENSION as f64);
        if !(tile_edge.is_finite() && tile_edge > 0.0) {
            return Err(GridError::Configuration(format!(
                "cannot tile {} into {} tiles",
                region, capacity
            )));
        }

        let mut tiles_per_axis = [0; DIMENSION];
        for (axis, count) in tiles_per_axis.iter_mut().enumerate() {
            *count = tiles_for_extent(region.extent(axis), tile_edge);
        }

        let mut tiling = Self {
            region,
            requested_capacity: capacity,
            tiles_per_axis,
            tile_edge,
            children: Vec::new(),
        };
        tiling.children = tiling
            .all_tiles()
            .map(|index| NodeKey::tile(&tiling.tile_region(index)))
            .collect();
        Ok(tiling)
    }

    /// Rebuilds the tiling recorded in a persisted root node.
    pub fn from_root<P>(root: &RootNode<P>) -> GridResult<Self> {
        let tiling = Self {
            region: root.region,
            requested_capacity: root.requested_capacity,
            tiles_per_axis: root.tiles_per_axis,
            tile_edge: root.tile_edge,
            children: root.children.clone(),
        };
        if tiling.tiles_per_axis.contains(&0) || !(tiling.tile_edge > 0.0) {
            return Err(GridError::Corrupted(format!(
                "root {} has an empty tiling",
                root.region
            )));
        }
        if tiling.children.len() != tiling.actual_capacity() {
            return Err(GridError::Corrupted(format!(
                "root {} lists {} children, tiling needs {}",
                root.region,
                tiling.children.len(),
                tiling.actual_capacity()
            )));
        }
        Ok(tiling)
    }

    pub fn region(&self) -> &BoundingBox {
        &self.region
    }

    pub fn requested_capacity(&self) -> usize {
        self.requested_capacity
    }

    pub fn tiles_per_axis(&self) -> TileIndex {
        self.tiles_per_axis
    }

    pub fn tile_edge(&self) -> f64 {
        self.tile_edge
    }

    /// Child tile keys in flat index order.
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Number of tiles actually created; never below the requested capacity.
    pub fn actual_capacity(&self) -> usize {
        self.tiles_per_axis.iter().product()
    }

    /// Range of tile indices whose tiles may overlap `shape`.
    ///
    /// Both ends are clamped into the grid, so shapes touching or crossing the
    /// region's upper boundary map onto the last tile of that axis.
    pub fn matching_tiles(&self, shape: &BoundingBox) -> TileRange {
        let mut mins = [0; DIMENSION];
        let mut maxs = [0; DIMENSION];
        for axis in 0..DIMENSION {
            mins[axis] = self.tile_index(axis, shape.low(axis));
            maxs[axis] = self.tile_index(axis, shape.high(axis));
        }
        TileRange::new(mins, maxs)
    }

    /// Index of the tile on `axis` whose lower bound is the greatest one not
    /// above `coordinate`, clamped into the grid.
    ///
    /// The division only gives a first guess; the result is settled against
    /// [`tile_low`](Self::tile_low) so it always agrees with
    /// [`tile_region`](Self::tile_region).
    fn tile_index(&self, axis: usize, coordinate: f64) -> usize {
        let count = self.tiles_per_axis[axis];
        let origin = self.region.low(axis);
        let mut index = clamp_index((coordinate - origin) / self.tile_edge, count);
        while index > 0 && self.tile_low(axis, index) > coordinate {
            index -= 1;
        }
        while index + 1 < count && self.tile_low(axis, index + 1) <= coordinate {
            index += 1;
        }
        index
    }

    fn tile_low(&self, axis: usize, index: usize) -> f64 {
        self.region.low(axis) + index as f64 * self.tile_edge
    }

    /// Range over every tile of the grid.
    pub fn all_tiles(&self) -> TileRange {
        TileRange::new([0; DIMENSION], self.tiles_per_axis.map(|n| n - 1))
    }

    /// Flattens a per-axis tile index into its slot in [`children`](Self::children).
    pub fn flat_index(&self, index: TileIndex) -> usize {
        let mut flat = 0;
        let mut offset = 1;
        for axis in 0..DIMENSION {
            flat += index[axis] * offset;
            offset *= self.tiles_per_axis[axis];
        }
        flat
    }

    /// Key of the tile at `index`.
    pub fn child_key(&self, index: TileIndex) -> Option<NodeKey> {
        self.children.get(self.flat_index(index)).copied()
    }

    /// Region of the tile at `index`. The last tile of each axis is clipped
    /// to the grid region.
    pub fn tile_region(&self, index: TileIndex) -> BoundingBox {
        let mut low = [0.0; DIMENSION];
        let mut high = [0.0; DIMENSION];
        for axis in 0..DIMENSION {
            let upper = self.region.high(axis);
            low[axis] = self.tile_low(axis, index[axis]);
            high[axis] = if index[axis] + 1 >= self.tiles_per_axis[axis] {
                upper
            } else {
                self.tile_low(axis, index[axis] + 1).min(upper)
            };
        }
        BoundingBox::new(low[0], low[1], high[0], high[1])
    }
}

/// Tiles needed to cover `extent` with tiles of `edge`, at least one.
pub(crate) fn tiles_for_extent(extent: f64, edge: f64) -> usize {
    let ratio = (extent / edge - TILE_EPSILON).ceil();
    if ratio < 1.0 {
        1
    } else {
        ratio as usize
    }
}

fn clamp_index(position: f64, count: usize) -> usize {
    let floor = position.floor();
    // NaN falls through to the first tile
    if !(floor > 0.0) {
        0
    } else if floor >= (count - 1) as f64 {
        count - 1
    } else {
        floor as usize
    }
}

/// Lazy iterator over the tile indices in the hyper-rectangle `mins..=maxs`,
/// in row-major order with axis 0 varying fastest.
///
/// The range is finite and can be restarted with [`restart`](Self::restart).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRange {
    mins: TileIndex,
    maxs: TileIndex,
    cursor: Option<TileIndex>,
}

impl TileRange {
    pub fn new(mins: TileIndex, maxs: TileIndex) -> Self {
        debug_assert!(
            mins.iter().zip(maxs.iter()).all(|(lo, hi)| lo <= hi),
            "tile range mins must not exceed maxs"
        );
        Self {
            mins,
            maxs,
            cursor: Some(mins),
        }
    }

    pub fn mins(&self) -> TileIndex {
        self.mins
    }

    pub fn maxs(&self) -> TileIndex {
        self.maxs
    }

    /// Total number of tiles in the range, regardless of iteration progress.
    pub fn tile_count(&self) -> usize {
        self.mins
            .iter()
            .zip(self.maxs.iter())
            .map(|(lo, hi)| hi - lo + 1)
            .product()
    }

    pub fn restart(&mut self) {
        self.cursor = Some(self.mins);
    }

    /// Moves `cursor` to the next index. Returns false once the range is
    /// exhausted, leaving `cursor` back at `mins`.
    fn increment(&self, cursor: &mut TileIndex) -> bool {
        for axis in 0..DIMENSION {
            if cursor[axis] < self.maxs[axis] {
                cursor[axis] += 1;
                return true;
            }
            cursor[axis] = self.mins[axis];
        }
        false
    }
}

impl Iterator for TileRange {
    type Item = TileIndex;

    fn next(&mut self) -> Option<TileIndex> {
        let current = self.cursor?;
        let mut next = current;
        self.cursor = if self.increment(&mut next) {
            Some(next)
        } else {
            None
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_grid() -> Tiling {
        Tiling::compute(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 4).unwrap()
    }

    #[test]
    fn test_compute_square_region() {
        let tiling = square_grid();
        assert_eq!(tiling.tile_edge(), 50.0);
        assert_eq!(tiling.tiles_per_axis(), [2, 2]);
        assert_eq!(tiling.actual_capacity(), 4);
        assert_eq!(tiling.children().len(), 4);
        assert_eq!(tiling.requested_capacity(), 4);
    }

    #[test]
    fn test_compute_rounds_capacity_up() {
        let tiling = Tiling::compute(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 5).unwrap();
        // edge = sqrt(2000) ~ 44.72, 100 / 44.72 ~ 2.24 -> 3 per axis
        assert_eq!(tiling.tiles_per_axis(), [3, 3]);
        assert_eq!(tiling.actual_capacity(), 9);
        assert!(tiling.actual_capacity() >= tiling.requested_capacity());
    }

    #[test]
    fn test_compute_non_square_region() {
        let tiling = Tiling::compute(BoundingBox::new(0.0, 0.0, 100.0, 25.0), 4).unwrap();
        assert_eq!(tiling.tile_edge(), 25.0);
        assert_eq!(tiling.tiles_per_axis(), [4, 1]);
        assert_eq!(tiling.actual_capacity(), 4);
    }

    #[test]
    fn test_compute_rejects_bad_configuration() {
        let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        assert!(matches!(
            Tiling::compute(region, 0),
            Err(GridError::Configuration(_))
        ));
        assert!(matches!(
            Tiling::compute(BoundingBox::new(0.0, 0.0, 0.0, 100.0), 4),
            Err(GridError::Configuration(_))
        ));
        assert!(matches!(
            Tiling::compute(BoundingBox::new(10.0, 10.0, 0.0, 0.0), 4),
            Err(GridError::Configuration(_))
        ));
        assert!(matches!(
            Tiling::compute(BoundingBox::new(0.0, 0.0, f64::INFINITY, 1.0), 4),
            Err(GridError::Configuration(_))
        ));
    }

    #[test]
    fn test_tiles_for_extent_epsilon() {
        assert_eq!(tiles_for_extent(100.0, 50.0), 2);
        assert_eq!(tiles_for_extent(100.0, 49.0), 3);
        assert_eq!(tiles_for_extent(1.0, 50.0), 1);
        // (0.1 + 0.2) / 0.1 lands just above 3 in floating point
        assert_eq!(tiles_for_extent(0.1 + 0.2, 0.1), 3);
    }

    #[test]
    fn test_tile_regions_cover_grid() {
        let tiling = square_grid();
        assert_eq!(tiling.tile_region([0, 0]), BoundingBox::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(tiling.tile_region([1, 0]), BoundingBox::new(50.0, 0.0, 100.0, 50.0));
        assert_eq!(tiling.tile_region([0, 1]), BoundingBox::new(0.0, 50.0, 50.0, 100.0));
        assert_eq!(tiling.tile_region([1, 1]), BoundingBox::new(50.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn test_last_tile_is_clipped() {
        let tiling = Tiling::compute(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 5).unwrap();
        let last = tiling.tile_region([2, 2]);
        assert_eq!(last.max_x, 100.0);
        assert_eq!(last.max_y, 100.0);
        assert!(tiling.region().contains(&last));
    }

    #[test]
    fn test_children_follow_flat_order() {
        let tiling = square_grid();
        for index in tiling.all_tiles() {
            let key = tiling.child_key(index).unwrap();
            assert_eq!(key, NodeKey::tile(&tiling.tile_region(index)));
            assert_eq!(tiling.children()[tiling.flat_index(index)], key);
        }
    }

    #[test]
    fn test_flat_index_axis_zero_fastest() {
        let tiling = Tiling::compute(BoundingBox::new(0.0, 0.0, 300.0, 200.0), 6).unwrap();
        assert_eq!(tiling.tiles_per_axis(), [3, 2]);
        assert_eq!(tiling.flat_index([0, 0]), 0);
        assert_eq!(tiling.flat_index([1, 0]), 1);
        assert_eq!(tiling.flat_index([2, 0]), 2);
        assert_eq!(tiling.flat_index([0, 1]), 3);
        assert_eq!(tiling.flat_index([2, 1]), 5);
    }

    #[test]
    fn test_matching_tiles_single_tile() {
        let range = square_grid().matching_tiles(&BoundingBox::new(10.0, 10.0, 20.0, 20.0));
        assert_eq!(range.mins(), [0, 0]);
        assert_eq!(range.maxs(), [0, 0]);
        assert_eq!(range.tile_count(), 1);
    }

    #[test]
    fn test_matching_tiles_spanning_all() {
        let tiling = square_grid();
        let range = tiling.matching_tiles(&BoundingBox::new(40.0, 40.0, 60.0, 60.0));
        assert_eq!(range.tile_count(), 4);

        // The upper boundary clamps onto the last tile
        let range = tiling.matching_tiles(&BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(range.mins(), [0, 0]);
        assert_eq!(range.maxs(), [1, 1]);
    }

    #[test]
    fn test_matching_tiles_clamps_both_ends() {
        let tiling = square_grid();
        let point = tiling.matching_tiles(&BoundingBox::new(100.0, 100.0, 100.0, 100.0));
        assert_eq!(point.mins(), [1, 1]);
        assert_eq!(point.maxs(), [1, 1]);

        let outside = tiling.matching_tiles(&BoundingBox::new(-50.0, -50.0, -10.0, 500.0));
        assert_eq!(outside.mins(), [0, 0]);
        assert_eq!(outside.maxs(), [0, 1]);
    }

    #[test]
    fn test_matching_tiles_with_offset_origin() {
        let tiling = Tiling::compute(BoundingBox::new(-100.0, -100.0, 100.0, 100.0), 16).unwrap();
        assert_eq!(tiling.tiles_per_axis(), [4, 4]);
        let range = tiling.matching_tiles(&BoundingBox::new(-10.0, 60.0, 10.0, 70.0));
        assert_eq!(range.mins(), [1, 3]);
        assert_eq!(range.maxs(), [2, 3]);
    }

    /// Coordinates within a few ulps of `boundary`, which must be positive.
    fn around(boundary: f64) -> Vec<f64> {
        let bits = boundary.to_bits();
        (bits - 3..=bits + 3).map(f64::from_bits).collect()
    }

    #[test]
    fn test_matching_tiles_agree_with_tile_regions_near_boundaries() {
        let tiling = Tiling::compute(BoundingBox::new(-3.3, 1.7, 97.1, 55.9), 13).unwrap();
        let [nx, ny] = tiling.tiles_per_axis();

        let mut points = vec![(5.807847279850585e1, 10.0)];
        for k in 1..nx {
            let boundary = tiling.tile_low(0, k);
            points.extend(around(boundary).into_iter().map(|x| (x, 10.0)));
        }
        for k in 0..ny {
            let boundary = tiling.tile_low(1, k);
            points.extend(around(boundary).into_iter().map(|y| (20.0, y)));
        }

        for (x, y) in points {
            let point = BoundingBox::new(x, y, x, y);
            if !tiling.region().contains(&point) {
                continue;
            }
            let range = tiling.matching_tiles(&point);
            assert_eq!(range.mins(), range.maxs());
            let tile = tiling.tile_region(range.mins());
            assert!(
                tile.intersects(&point),
                "{} mapped to tile {:?} = {}",
                point,
                range.mins(),
                tile
            );
        }
    }

    #[test]
    fn test_tile_index_is_monotonic() {
        let tiling = Tiling::compute(BoundingBox::new(-3.3, 1.7, 97.1, 55.9), 13).unwrap();
        let mut last = 0;
        let mut x = -3.3;
        while x <= 97.1 {
            let index = tiling.tile_index(0, x);
            assert!(index >= last);
            last = index;
            x += 0.0137;
        }
        assert_eq!(last, tiling.tiles_per_axis()[0] - 1);
    }

    #[test]
    fn test_tile_range_row_major_order() {
        let range = TileRange::new([1, 2], [2, 4]);
        let visited: Vec<TileIndex> = range.collect();
        assert_eq!(
            visited,
            vec![[1, 2], [2, 2], [1, 3], [2, 3], [1, 4], [2, 4]]
        );
    }

    #[test]
    fn test_tile_range_restart() {
        let mut range = TileRange::new([0, 0], [1, 0]);
        assert_eq!(range.next(), Some([0, 0]));
        assert_eq!(range.next(), Some([1, 0]));
        assert_eq!(range.next(), None);
        assert_eq!(range.next(), None);
        range.restart();
        assert_eq!(range.count(), 2);
    }

    #[test]
    fn test_tile_range_count_matches_iteration() {
        let range = TileRange::new([0, 3], [4, 5]);
        assert_eq!(range.tile_count(), 15);
        assert_eq!(range.clone().count(), 15);
    }

    #[test]
    fn test_from_root_validates_children() {
        let tiling = square_grid();
        let mut root = RootNode::<u32> {
            region: *tiling.region(),
            requested_capacity: 4,
            tiles_per_axis: tiling.tiles_per_axis(),
            tile_edge: tiling.tile_edge(),
            children: tiling.children().to_vec(),
            data: Default::default(),
        };
        assert_eq!(Tiling::from_root(&root).unwrap(), tiling);

        root.children.pop();
        assert!(matches!(Tiling::from_root(&root), Err(GridError::Corrupted(_))));
    }
}
