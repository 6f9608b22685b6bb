//! Grid-based spatial index.
//!
//! The index covers a fixed bounding region split into a regular array of
//! tiles. Each inserted shape is copied into every tile it overlaps, unless it
//! spans more than [`MAX_INSERTION`](grid_constants::MAX_INSERTION) tiles, in
//! which case a single copy is kept in the root node's overflow set.
//!
//! Nodes are never cached by the [`Grid`]: every operation reads the nodes it
//! needs from a [`NodeStore`] and writes back the ones it changed.

pub mod grid_constants;
pub mod grid_types;
pub mod tiling;
pub mod grid_storage;
pub mod grid_config;
pub mod visitor;
mod grid_impl;
mod sync_grid;

pub use grid_types::{
    GridError, GridResult, GridStats, NodeKey, GridData, TileNode, RootNode, GridNode, QueryMode,
    Payload,
};
pub use grid_constants::{MAX_INSERTION, TILE_EPSILON};
pub use tiling::{Tiling, TileIndex, TileRange};
pub use grid_storage::{NodeStore, MemoryNodeStore, FileNodeStore, FileHeader};
pub use grid_config::GridConfig;
pub use visitor::{Visitor, CollectingVisitor};
pub use grid_impl::{Grid, Recovery};
pub use sync_grid::SyncGrid;
