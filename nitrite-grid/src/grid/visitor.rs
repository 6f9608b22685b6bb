//! Callbacks receiving query hits.

use std::collections::HashSet;
use std::hash::Hash;

use crate::grid::grid_types::GridData;

/// Receives every stored item matching a query.
///
/// Closures taking `&GridData<P>` are visitors:
///
/// ```rust
/// use nitrite_grid::{BoundingBox, GridData, Visitor};
///
/// let mut hits = 0;
/// let mut count = |_: &GridData<u32>| hits += 1;
/// count.visit_data(&GridData::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 7));
/// assert_eq!(hits, 1);
/// ```
pub trait Visitor<P> {
    fn visit_data(&mut self, data: &GridData<P>);
}

impl<P, F> Visitor<P> for F
where
    F: FnMut(&GridData<P>),
{
    fn visit_data(&mut self, data: &GridData<P>) {
        self(data)
    }
}

/// Visitor gathering distinct hits.
///
/// A shape copied into several tiles is reported once per copy; collecting
/// into a set folds the copies back into one item.
#[derive(Debug, Clone)]
pub struct CollectingVisitor<P> {
    items: HashSet<GridData<P>>,
    visits: usize,
}

impl<P: Clone + Eq + Hash> CollectingVisitor<P> {
    pub fn new() -> Self {
        Self {
            items: HashSet::new(),
            visits: 0,
        }
    }

    /// Number of `visit_data` calls, counting duplicate copies.
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, data: &GridData<P>) -> bool {
        self.items.contains(data)
    }

    pub fn into_items(self) -> Vec<GridData<P>> {
        self.items.into_iter().collect()
    }
}

impl<P: Clone + Eq + Hash> Default for CollectingVisitor<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + Eq + Hash> Visitor<P> for CollectingVisitor<P> {
    fn visit_data(&mut self, data: &GridData<P>) {
        self.visits += 1;
        if !self.items.contains(data) {
            self.items.insert(data.clone());
        }
    }
}
