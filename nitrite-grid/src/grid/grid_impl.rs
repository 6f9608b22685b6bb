//! Grid implementation.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::bounding_box::BoundingBox;
use crate::grid::grid_config::GridConfig;
use crate::grid::grid_constants::{DIMENSION, MAX_INSERTION};
use crate::grid::grid_storage::NodeStore;
use crate::grid::grid_types::{
    GridData, GridError, GridNode, GridResult, GridStats, NodeKey, Payload, QueryMode, RootNode,
    TileNode,
};
use crate::grid::tiling::{TileIndex, Tiling};
use crate::grid::visitor::{CollectingVisitor, Visitor};

/// Outcome of looking for a persisted grid in a store.
#[derive(Debug)]
pub enum Recovery<P> {
    /// The persisted root, with its child keys canonicalized by the store.
    Recovered(RootNode<P>),
    /// The store reports no bounds, so there is no region to look a root up by.
    NoBounds,
    /// The store has bounds but no root stored under them.
    RootNotFound(NodeKey),
}

/// Grid-based spatial index over a fixed region.
///
/// The grid owns its store and the tiling; nodes are read from the store on
/// every call and written back when they change. Mutating methods take
/// `&mut self`; wrap the grid in [`SyncGrid`](crate::SyncGrid) to share it
/// between threads.
///
/// # Examples
///
/// ```rust
/// use nitrite_grid::{BoundingBox, Grid, MemoryNodeStore, QueryMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
/// let mut grid = Grid::new(region, 4, MemoryNodeStore::new())?;
///
/// grid.insert_data("lake".to_string(), BoundingBox::new(10.0, 10.0, 20.0, 20.0))?;
///
/// let hits = grid.find_intersecting(&BoundingBox::new(15.0, 15.0, 30.0, 30.0))?;
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].payload, "lake");
/// # Ok(())
/// # }
/// ```
pub struct Grid<P: Payload, S: NodeStore<P>> {
    tiling: Tiling,
    root_key: NodeKey,
    store: S,
    stats: GridStats,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload, S: NodeStore<P>> Grid<P, S> {
    /// Opens the grid persisted in `store`, or builds a fresh one over
    /// `region` split into at least `capacity` tiles.
    ///
    /// A fresh build clears the store first. When a grid is recovered, its
    /// persisted region and tiling win over the arguments.
    pub fn new(region: BoundingBox, capacity: usize, store: S) -> GridResult<Self> {
        GridConfig::new(region, capacity).validate()?;

        match Self::initialize_from_storage(&store)? {
            Recovery::Recovered(root) => {
                if root.region != region || root.requested_capacity != capacity {
                    log::warn!(
                        "Store holds a grid over {} with capacity {}, ignoring requested {} with capacity {}",
                        root.region,
                        root.requested_capacity,
                        region,
                        capacity
                    );
                }
                Self::recover(root, store)
            }
            Recovery::NoBounds => {
                log::debug!("Store has no bounds, building a fresh grid over {}", region);
                Self::build(region, capacity, store)
            }
            Recovery::RootNotFound(key) => {
                log::debug!("No {} in store, building a fresh grid over {}", key, region);
                Self::build(region, capacity, store)
            }
        }
    }

    /// Builds or recovers a grid from a [`GridConfig`].
    pub fn from_config(config: GridConfig, store: S) -> GridResult<Self> {
        Self::new(config.region, config.capacity, store)
    }

    /// Builds or recovers a grid from its property-bag configuration.
    pub fn from_properties(props: &HashMap<String, String>, store: S) -> GridResult<Self> {
        Self::from_config(GridConfig::from_properties(props)?, store)
    }

    /// Opens the grid persisted in `store`, failing when there is none.
    pub fn open(store: S) -> GridResult<Self> {
        match Self::initialize_from_storage(&store)? {
            Recovery::Recovered(root) => Self::recover(root, store),
            Recovery::NoBounds => Err(GridError::NotInitialized(
                "store reports no bounds".into(),
            )),
            Recovery::RootNotFound(key) => Err(GridError::NodeNotFound(key)),
        }
    }

    /// Looks for a persisted root in `store`.
    ///
    /// The region comes from the store's bounds. Every child key of the
    /// recovered root is resolved through
    /// [`NodeStore::find_unique_instance`] before it is used.
    pub fn initialize_from_storage(store: &S) -> GridResult<Recovery<P>> {
        let expected = std::any::type_name::<P>();
        if let Some(found) = store.payload_types().into_iter().find(|t| t != expected) {
            return Err(GridError::PayloadMismatch {
                expected: expected.to_string(),
                found,
            });
        }

        let region = match store.bounds() {
            Some(region) => region,
            None => {
                log::debug!("Grid recovery skipped: store reports no bounds");
                return Ok(Recovery::NoBounds);
            }
        };

        let root_key = store.find_unique_instance(&NodeKey::root(&region));
        let mut root = match store.get(&root_key)? {
            Some(GridNode::Root(root)) => root,
            Some(GridNode::Tile(_)) => {
                return Err(GridError::Corrupted(format!(
                    "{} holds a tile instead of the root",
                    root_key
                )))
            }
            None => return Ok(Recovery::RootNotFound(root_key)),
        };

        for child in root.children.iter_mut() {
            *child = store.find_unique_instance(child);
        }
        Ok(Recovery::Recovered(root))
    }

    fn build(region: BoundingBox, capacity: usize, mut store: S) -> GridResult<Self> {
        let tiling = Tiling::compute(region, capacity)?;
        let stats = bootstrap::<P, S>(&tiling, &mut store)?;
        Ok(Self {
            root_key: NodeKey::root(tiling.region()),
            tiling,
            store,
            stats,
            _payload: PhantomData,
        })
    }

    fn recover(root: RootNode<P>, store: S) -> GridResult<Self> {
        let root_key = NodeKey::root(&root.region);
        let tiling = Tiling::from_root(&root)?;

        let mut stats = GridStats {
            node_count: tiling.children().len() as u64 + 1,
            data_count: root.data.len() as u64,
            root_insertions: root.data.len() as u64,
        };
        for key in tiling.children() {
            let node = store.get(key)?.ok_or(GridError::NodeNotFound(*key))?;
            stats.data_count += node.num_data() as u64;
        }

        log::info!(
            "Recovered grid over {}: {} tiles, {} stored items",
            root.region,
            tiling.actual_capacity(),
            stats.data_count
        );
        Ok(Self {
            tiling,
            root_key,
            store,
            stats,
            _payload: PhantomData,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Region covered by the grid.
    pub fn region(&self) -> &BoundingBox {
        self.tiling.region()
    }

    pub fn dimension(&self) -> usize {
        DIMENSION
    }

    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    pub fn requested_capacity(&self) -> usize {
        self.tiling.requested_capacity()
    }

    /// Number of tiles, at least the requested capacity.
    pub fn actual_capacity(&self) -> usize {
        self.tiling.actual_capacity()
    }

    pub fn tiles_per_axis(&self) -> TileIndex {
        self.tiling.tiles_per_axis()
    }

    pub fn tile_edge(&self) -> f64 {
        self.tiling.tile_edge()
    }

    /// Tile keys in flat index order.
    pub fn children(&self) -> &[NodeKey] {
        self.tiling.children()
    }

    pub fn root_key(&self) -> &NodeKey {
        &self.root_key
    }

    pub fn stats(&self) -> GridStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Releases the store, e.g. to reopen the grid from it later.
    pub fn into_store(self) -> S {
        self.store
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// Inserts `payload` with `shape`.
    ///
    /// The shape must lie inside the grid region. It is copied into every
    /// tile it overlaps, or stored once in the root when it spans more than
    /// [`MAX_INSERTION`] tiles. Inserting an equal pair again changes nothing.
    pub fn insert_data(&mut self, payload: P, shape: BoundingBox) -> GridResult<()> {
        self.check_shape(&shape)?;
        if !self.region().contains(&shape) {
            return Err(GridError::OutOfBounds {
                shape,
                region: *self.region(),
            });
        }

        let range = self.tiling.matching_tiles(&shape);
        let data = GridData::new(shape, payload);

        if range.tile_count() > MAX_INSERTION {
            let root_key = self.root_key;
            if self.insert_into_node(&root_key, data)? {
                self.stats.data_count += 1;
            }
            self.stats.root_insertions += 1;
            log::trace!("{} spans {} tiles, stored at root", shape, range.tile_count());
            return Ok(());
        }

        for index in range {
            if !self.tiling.tile_region(index).intersects(&shape) {
                continue;
            }
            let key = self.child_key(index)?;
            if self.insert_into_node(&key, data.clone())? {
                self.stats.data_count += 1;
            }
        }
        Ok(())
    }

    /// Adds `data` to the node at `key`, writing the node only if it changed.
    fn insert_into_node(&mut self, key: &NodeKey, data: GridData<P>) -> GridResult<bool> {
        let mut node = self.read_node(key)?;
        if !node.insert_data(data) {
            return Ok(false);
        }
        self.store.put(node)?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Deletes every stored copy of `(shape, payload)`.
    ///
    /// Returns whether anything was removed.
    pub fn delete_data(&mut self, payload: P, shape: BoundingBox) -> GridResult<bool> {
        let root_key = self.root_key;
        self.delete_from_node(&root_key, payload, shape)
    }

    /// Deletes `(shape, payload)` from the node at `key`.
    ///
    /// Deleting from the root also sweeps every tile the shape maps to, since
    /// fan-out may have left copies in several of them.
    pub fn delete_from_node(
        &mut self,
        key: &NodeKey,
        payload: P,
        shape: BoundingBox,
    ) -> GridResult<bool> {
        if !shape.is_valid() || !self.region().contains(&shape) {
            return Ok(false);
        }

        let data = GridData::new(shape, payload);
        let mut removed = self.remove_from_node(key, &data)?;
        if key.is_root() {
            removed |= self.delete_data_recursively(&data)?;
        }
        Ok(removed)
    }

    fn delete_data_recursively(&mut self, data: &GridData<P>) -> GridResult<bool> {
        let mut removed = false;
        for index in self.tiling.matching_tiles(&data.shape) {
            let key = self.child_key(index)?;
            removed |= self.remove_from_node(&key, data)?;
        }
        Ok(removed)
    }

    fn remove_from_node(&mut self, key: &NodeKey, data: &GridData<P>) -> GridResult<bool> {
        let mut node = self.read_node(key)?;
        if !node.delete_data(data) {
            return Ok(false);
        }
        self.store.put(node)?;
        self.stats.data_count = self.stats.data_count.saturating_sub(1);
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Reports every item of `node` matching `query` under `mode`.
    ///
    /// Returns the number of items reported.
    pub fn visit_data<V: Visitor<P>>(
        &self,
        node: &GridNode<P>,
        visitor: &mut V,
        query: &BoundingBox,
        mode: QueryMode,
    ) -> usize {
        let mut hits = 0;
        for data in node.data() {
            if mode.matches_data(query, &data.shape) {
                visitor.visit_data(data);
                hits += 1;
            }
        }
        hits
    }

    /// Reads the node at `key` if its region passes the coarse filter.
    ///
    /// The region is taken from the key, so rejected nodes are never read.
    pub fn visit_node(
        &self,
        key: &NodeKey,
        query: &BoundingBox,
        mode: QueryMode,
    ) -> GridResult<Option<GridNode<P>>> {
        if !mode.matches_node(query, &key.region()) {
            return Ok(None);
        }
        self.read_node(key).map(Some)
    }

    /// Reports every stored copy matching `query`: the root overflow set
    /// first, then the tiles overlapping the query.
    ///
    /// Items copied into several tiles may be reported more than once.
    /// Returns the number of reports.
    pub fn query<V: Visitor<P>>(
        &self,
        query: &BoundingBox,
        mode: QueryMode,
        visitor: &mut V,
    ) -> GridResult<usize> {
        self.check_shape(query)?;

        let mut hits = 0;
        let root = match self.visit_node(&self.root_key, query, mode)? {
            Some(root) => root,
            None => return Ok(0),
        };
        hits += self.visit_data(&root, visitor, query, mode);

        for index in self.tiling.matching_tiles(query) {
            let key = self.child_key(index)?;
            if let Some(node) = self.visit_node(&key, query, mode)? {
                hits += self.visit_data(&node, visitor, query, mode);
            }
        }
        Ok(hits)
    }

    /// Distinct items whose shape intersects `query`.
    pub fn find_intersecting(&self, query: &BoundingBox) -> GridResult<Vec<GridData<P>>> {
        self.collect(query, QueryMode::Intersection)
    }

    /// Distinct items whose shape lies inside `query`.
    pub fn find_contained(&self, query: &BoundingBox) -> GridResult<Vec<GridData<P>>> {
        self.collect(query, QueryMode::Containment)
    }

    /// Number of distinct items, folding fan-out copies together.
    pub fn item_count(&self) -> GridResult<usize> {
        let region = *self.region();
        let mut visitor = CollectingVisitor::new();
        self.query(&region, QueryMode::Intersection, &mut visitor)?;
        Ok(visitor.len())
    }

    fn collect(&self, query: &BoundingBox, mode: QueryMode) -> GridResult<Vec<GridData<P>>> {
        let mut visitor = CollectingVisitor::new();
        self.query(query, mode, &mut visitor)?;
        Ok(visitor.into_items())
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Drops all data and rebuilds an empty grid over the same region.
    pub fn clear(&mut self) -> GridResult<()> {
        let tiling = Tiling::compute(*self.region(), self.requested_capacity())?;
        self.stats = bootstrap::<P, S>(&tiling, &mut self.store)?;
        self.root_key = NodeKey::root(tiling.region());
        self.tiling = tiling;
        Ok(())
    }

    pub fn flush(&mut self) -> GridResult<()> {
        self.store.flush()
    }

    fn read_node(&self, key: &NodeKey) -> GridResult<GridNode<P>> {
        self.store.get(key)?.ok_or(GridError::NodeNotFound(*key))
    }

    fn child_key(&self, index: TileIndex) -> GridResult<NodeKey> {
        self.tiling.child_key(index).ok_or_else(|| {
            GridError::Corrupted(format!("no child for tile index {:?}", index))
        })
    }

    fn check_shape(&self, shape: &BoundingBox) -> GridResult<()> {
        if !shape.is_valid() {
            return Err(GridError::InvalidShape(format!(
                "{} must have finite coordinates with min <= max",
                shape
            )));
        }
        Ok(())
    }
}

/// Clears `store` and writes an empty root plus one tile per slot of `tiling`.
fn bootstrap<P: Payload, S: NodeStore<P>>(tiling: &Tiling, store: &mut S) -> GridResult<GridStats> {
    store.clear()?;

    // split: one tile per index, in child order
    for index in tiling.all_tiles() {
        let tile = TileNode::new(tiling.tile_region(index));
        debug_assert_eq!(
            Some(NodeKey::tile(&tile.region)),
            tiling.child_key(index),
            "tile written out of child order"
        );
        store.put(GridNode::Tile(tile))?;
    }

    store.put(GridNode::Root(RootNode {
        region: *tiling.region(),
        requested_capacity: tiling.requested_capacity(),
        tiles_per_axis: tiling.tiles_per_axis(),
        tile_edge: tiling.tile_edge(),
        children: tiling.children().to_vec(),
        data: Default::default(),
    }))?;
    store.flush()?;

    log::info!(
        "Built grid over {}: {:?} tiles of edge {}",
        tiling.region(),
        tiling.tiles_per_axis(),
        tiling.tile_edge()
    );
    Ok(GridStats {
        node_count: tiling.actual_capacity() as u64 + 1,
        data_count: 0,
        root_insertions: 0,
    })
}
