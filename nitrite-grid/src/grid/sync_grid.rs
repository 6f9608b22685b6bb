//! Thread-safe wrapper for sharing a grid between threads.
//!
//! [`SyncGrid`] keeps a [`Grid`] behind `Arc<RwLock<_>>`. Queries take the
//! read lock and run concurrently; inserts, deletes and `clear` take the
//! write lock.
//!
//! # Examples
//!
//! ```rust
//! use nitrite_grid::{BoundingBox, Grid, MemoryNodeStore, SyncGrid};
//! use std::thread;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
//! let grid = SyncGrid::new(Grid::new(region, 16, MemoryNodeStore::new())?);
//!
//! let writer = grid.clone();
//! let handle = thread::spawn(move || {
//!     writer.insert_data(1u32, BoundingBox::new(1.0, 1.0, 2.0, 2.0)).unwrap();
//! });
//! handle.join().unwrap();
//!
//! assert_eq!(grid.find_intersecting(&region)?.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bounding_box::BoundingBox;
use crate::grid::grid_impl::Grid;
use crate::grid::grid_storage::NodeStore;
use crate::grid::grid_types::{GridData, GridResult, GridStats, Payload, QueryMode};
use crate::grid::visitor::Visitor;

/// Cloneable handle to a grid guarded by a read-write lock.
pub struct SyncGrid<P: Payload, S: NodeStore<P>> {
    inner: Arc<RwLock<Grid<P, S>>>,
}

impl<P: Payload, S: NodeStore<P>> Clone for SyncGrid<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload, S: NodeStore<P>> SyncGrid<P, S> {
    pub fn new(grid: Grid<P, S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(grid)),
        }
    }

    // ===== Mutations =====

    pub fn insert_data(&self, payload: P, shape: BoundingBox) -> GridResult<()> {
        self.inner.write().insert_data(payload, shape)
    }

    pub fn delete_data(&self, payload: P, shape: BoundingBox) -> GridResult<bool> {
        self.inner.write().delete_data(payload, shape)
    }

    pub fn clear(&self) -> GridResult<()> {
        self.inner.write().clear()
    }

    pub fn flush(&self) -> GridResult<()> {
        self.inner.write().flush()
    }

    // ===== Queries =====

    pub fn query<V: Visitor<P>>(
        &self,
        query: &BoundingBox,
        mode: QueryMode,
        visitor: &mut V,
    ) -> GridResult<usize> {
        self.inner.read().query(query, mode, visitor)
    }

    pub fn find_intersecting(&self, query: &BoundingBox) -> GridResult<Vec<GridData<P>>> {
        self.inner.read().find_intersecting(query)
    }

    pub fn find_contained(&self, query: &BoundingBox) -> GridResult<Vec<GridData<P>>> {
        self.inner.read().find_contained(query)
    }

    pub fn item_count(&self) -> GridResult<usize> {
        self.inner.read().item_count()
    }

    pub fn stats(&self) -> GridStats {
        self.inner.read().stats()
    }

    pub fn region(&self) -> BoundingBox {
        *self.inner.read().region()
    }

    // ===== Lock Access =====

    /// Read access to the grid for several calls under one lock.
    pub fn read(&self) -> RwLockReadGuard<'_, Grid<P, S>> {
        self.inner.read()
    }

    /// Exclusive access to the grid for several calls under one lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, Grid<P, S>> {
        self.inner.write()
    }

    /// Returns the grid if this is the last handle.
    pub fn try_unwrap(self) -> Result<Grid<P, S>, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}
