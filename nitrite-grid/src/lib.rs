//! # Nitrite Grid - Grid-Based Spatial Indexing
//!
//! This crate provides a grid spatial index: a fixed two-dimensional region
//! is split into a regular array of square tiles, and every stored shape is
//! filed under the tiles it overlaps.
//!
//! ## Features
//!
//! - **Bounded Fan-Out**: A shape goes into at most
//!   [`MAX_INSERTION`] tiles; wider shapes are kept once in the root node
//! - **Pluggable Storage**: Nodes live in a [`NodeStore`], in memory or in an
//!   append-only node file
//! - **Persistent**: A grid stored in a [`FileNodeStore`] is recovered on open
//! - **Two Query Modes**: Intersection and containment, reported through a
//!   [`Visitor`]
//! - **Thread Safe Wrapper**: [`SyncGrid`] shares one grid between threads
//!
//! ## Quick Start
//!
//! ```rust
//! use nitrite_grid::{BoundingBox, Grid, MemoryNodeStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
//! let mut grid = Grid::new(region, 4, MemoryNodeStore::new())?;
//!
//! grid.insert_data(1u64, BoundingBox::new(10.0, 10.0, 20.0, 20.0))?;
//! grid.insert_data(2u64, BoundingBox::new(40.0, 40.0, 60.0, 60.0))?;
//!
//! let hits = grid.find_intersecting(&BoundingBox::new(0.0, 0.0, 45.0, 45.0))?;
//! assert_eq!(hits.len(), 2);
//!
//! let inside = grid.find_contained(&BoundingBox::new(0.0, 0.0, 45.0, 45.0))?;
//! assert_eq!(inside.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistent Grid
//!
//! ```rust,no_run
//! use nitrite_grid::{BoundingBox, FileNodeStore, Grid};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let region = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
//! let store = FileNodeStore::<String>::open_or_create("places.grid")?;
//! let mut grid = Grid::new(region, 64, store)?;
//!
//! grid.insert_data("harbour".to_string(), BoundingBox::new(4.8, 52.3, 4.9, 52.4))?;
//! grid.flush()?;
//!
//! // Reopening finds the same grid
//! let grid = Grid::open(FileNodeStore::<String>::open("places.grid")?)?;
//! assert_eq!(grid.item_count()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod grid;

pub use bounding_box::BoundingBox;
pub use grid::{
    CollectingVisitor, FileHeader, FileNodeStore, Grid, GridConfig, GridData, GridError, GridNode,
    GridResult, GridStats, MemoryNodeStore, NodeKey, NodeStore, Payload, QueryMode, Recovery,
    RootNode, SyncGrid, TileIndex, TileNode, TileRange, Tiling, Visitor, MAX_INSERTION,
    TILE_EPSILON,
};
