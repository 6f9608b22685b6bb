//! Core types and data structures for the grid index.
//!
//! This module defines the fundamental types used throughout the grid:
//! - Error types and result types
//! - Node keys and the two node variants (tile and root)
//! - Statistics and query modes

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::io;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounding_box::BoundingBox;
use crate::grid::grid_constants::DIMENSION;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in grid index operations
#[derive(Debug, Error)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Shape {shape} is outside of the grid region {region}")]
    OutOfBounds {
        shape: BoundingBox,
        region: BoundingBox,
    },

    #[error("Grid is not initialized: {0}")]
    NotInitialized(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Store holds payload type {found}, expected {expected}")]
    PayloadMismatch { expected: String, found: String },

    #[error("Corrupted store: {0}")]
    Corrupted(String),
}

/// Result type for grid operations
pub type GridResult<T> = Result<T, GridError>;

/// Bounds every payload stored in the grid must satisfy.
///
/// Payloads are compared structurally, so two items with equal shapes and
/// equal payloads are the same item.
pub trait Payload: Clone + Eq + Hash + Serialize + DeserializeOwned {}

impl<T> Payload for T where T: Clone + Eq + Hash + Serialize + DeserializeOwned {}

// ============================================================================
// Node Keys
// ============================================================================

/// Identifies a node by its role and the bit pattern of its region.
///
/// Keys are derived from content, so a key built from the same region always
/// equals the key the node was stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    Root([u64; 4]),
    Tile([u64; 4]),
}

impl NodeKey {
    pub fn root(region: &BoundingBox) -> Self {
        NodeKey::Root(region.to_bits())
    }

    pub fn tile(region: &BoundingBox) -> Self {
        NodeKey::Tile(region.to_bits())
    }

    /// Region the key was derived from.
    pub fn region(&self) -> BoundingBox {
        match self {
            NodeKey::Root(bits) | NodeKey::Tile(bits) => BoundingBox::from_bits(*bits),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, NodeKey::Root(_))
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::Root(_) => write!(f, "root {}", self.region()),
            NodeKey::Tile(_) => write!(f, "tile {}", self.region()),
        }
    }
}

// ============================================================================
// Data and Node Types
// ============================================================================

/// A shape together with its payload; the unit of storage in a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridData<P> {
    pub shape: BoundingBox,
    pub payload: P,
}

impl<P> GridData<P> {
    pub fn new(shape: BoundingBox, payload: P) -> Self {
        Self { shape, payload }
    }
}

/// A leaf tile of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: DeserializeOwned + Eq + Hash"
))]
pub struct TileNode<P> {
    pub region: BoundingBox,
    pub data: HashSet<GridData<P>>,
}

impl<P> TileNode<P> {
    pub fn new(region: BoundingBox) -> Self {
        Self {
            region,
            data: HashSet::new(),
        }
    }
}

/// The single top-level node: tiling parameters, ordered child keys and the
/// overflow set for shapes spanning too many tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: DeserializeOwned + Eq + Hash"
))]
pub struct RootNode<P> {
    pub region: BoundingBox,
    pub requested_capacity: usize,
    pub tiles_per_axis: [usize; DIMENSION],
    pub tile_edge: f64,
    pub children: Vec<NodeKey>,
    pub data: HashSet<GridData<P>>,
}

/// A grid node: either a tile or the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: DeserializeOwned + Eq + Hash"
))]
pub enum GridNode<P> {
    Tile(TileNode<P>),
    Root(RootNode<P>),
}

impl<P: Eq + Hash> GridNode<P> {
    pub fn key(&self) -> NodeKey {
        match self {
            GridNode::Tile(tile) => NodeKey::tile(&tile.region),
            GridNode::Root(root) => NodeKey::root(&root.region),
        }
    }

    pub fn region(&self) -> &BoundingBox {
        match self {
            GridNode::Tile(tile) => &tile.region,
            GridNode::Root(root) => &root.region,
        }
    }

    pub fn data(&self) -> &HashSet<GridData<P>> {
        match self {
            GridNode::Tile(tile) => &tile.data,
            GridNode::Root(root) => &root.data,
        }
    }

    fn data_mut(&mut self) -> &mut HashSet<GridData<P>> {
        match self {
            GridNode::Tile(tile) => &mut tile.data,
            GridNode::Root(root) => &mut root.data,
        }
    }

    /// Adds `data` unless an equal item is present. Returns whether it was added.
    pub fn insert_data(&mut self, data: GridData<P>) -> bool {
        self.data_mut().insert(data)
    }

    /// Removes an item equal to `data`. Returns whether one was present.
    pub fn delete_data(&mut self, data: &GridData<P>) -> bool {
        self.data_mut().remove(data)
    }

    pub fn num_data(&self) -> usize {
        self.data().len()
    }

    pub fn clear(&mut self) {
        self.data_mut().clear();
    }

    pub fn is_root(&self) -> bool {
        matches!(self, GridNode::Root(_))
    }

    pub fn into_root(self) -> Option<RootNode<P>> {
        match self {
            GridNode::Root(root) => Some(root),
            GridNode::Tile(_) => None,
        }
    }
}

// HashSet equality needs `Eq + Hash` items, which derive cannot express.
impl<P: Eq + Hash> PartialEq for TileNode<P> {
    fn eq(&self, other: &Self) -> bool {
        self.region == other.region && self.data == other.data
    }
}

impl<P: Eq + Hash> PartialEq for RootNode<P> {
    fn eq(&self, other: &Self) -> bool {
        self.region == other.region
            && self.requested_capacity == other.requested_capacity
            && self.tiles_per_axis == other.tiles_per_axis
            && self.tile_edge.to_bits() == other.tile_edge.to_bits()
            && self.children == other.children
            && self.data == other.data
    }
}

impl<P: Eq + Hash> PartialEq for GridNode<P> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GridNode::Tile(a), GridNode::Tile(b)) => a == b,
            (GridNode::Root(a), GridNode::Root(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters maintained by the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Root plus all tiles
    pub node_count: u64,
    /// Stored copies across root and tiles
    pub data_count: u64,
    /// Inserts routed to the root overflow set. Rebuilt from the overflow
    /// set size when a grid is recovered.
    pub root_insertions: u64,
}

// ============================================================================
// Query Modes
// ============================================================================

/// How a query region is matched against stored shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Shapes intersecting the query region
    Intersection,
    /// Shapes fully contained in the query region
    Containment,
}

impl QueryMode {
    /// Fine filter applied to each stored shape.
    pub fn matches_data(&self, query: &BoundingBox, shape: &BoundingBox) -> bool {
        match self {
            QueryMode::Intersection => query.intersects(shape),
            QueryMode::Containment => query.contains(shape),
        }
    }

    /// Coarse filter applied to a node region before the node is read.
    ///
    /// A shape contained in the query also intersects every tile it was filed
    /// in, so both modes admit a node when its region intersects the query.
    pub fn matches_node(&self, query: &BoundingBox, region: &BoundingBox) -> bool {
        query.intersects(region)
    }
}
