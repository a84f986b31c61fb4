//! Throwaway R-tree indexes over nodes and shapes.
//!
//! Indexes are bulk-loaded from a snapshot of the network, queried during
//! one phase and then dropped. They are never kept in sync with later edits
//! except through [`NodeTree::remove`] within the phase that built them.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use super::node::NodeId;
use super::shape::ShapeId;
use crate::geom::{Point, Rect};

type IndexedPoint = GeomWithData<[i64; 2], NodeId>;
type IndexedRect = GeomWithData<Rectangle<[i64; 2]>, ShapeId>;

fn corner(p: Point) -> [i64; 2] {
    [p.x, p.y]
}

fn envelope(rect: &Rect) -> AABB<[i64; 2]> {
    AABB::from_corners([rect.xlo, rect.ylo], [rect.xhi, rect.yhi])
}

/// Point index over node locations.
#[derive(Debug)]
pub struct NodeTree {
    tree: RTree<IndexedPoint>,
}

impl NodeTree {
    pub fn new(entries: impl IntoIterator<Item = (Point, NodeId)>) -> Self {
        let items = entries
            .into_iter()
            .map(|(p, id)| GeomWithData::new(corner(p), id))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Nodes inside `rect`, boundary included.
    pub fn in_rect(&self, rect: &Rect) -> Vec<NodeId> {
        self.tree.locate_in_envelope(&envelope(rect)).map(|e| e.data).collect()
    }

    /// Whether any node lies inside `rect`.
    pub fn any_in_rect(&self, rect: &Rect) -> bool {
        self.tree.locate_in_envelope(&envelope(rect)).next().is_some()
    }

    /// Nodes within euclidean distance `radius` of `center`.
    pub fn within(&self, center: Point, radius: i64) -> Vec<NodeId> {
        self.tree
            .locate_within_distance(corner(center), radius.saturating_mul(radius))
            .map(|e| e.data)
            .collect()
    }

    /// All nodes at the minimum distance from `p`.
    pub fn nearest(&self, p: Point) -> Vec<NodeId> {
        self.tree.nearest_neighbors(&corner(p)).into_iter().map(|e| e.data).collect()
    }

    /// Remove one entry; returns whether it was present.
    pub fn remove(&mut self, p: Point, id: NodeId) -> bool {
        self.tree.remove(&GeomWithData::new(corner(p), id)).is_some()
    }
}

/// Rectangle index over shapes.
#[derive(Debug)]
pub struct ShapeTree {
    tree: RTree<IndexedRect>,
}

impl ShapeTree {
    pub fn new(entries: impl IntoIterator<Item = (Rect, ShapeId)>) -> Self {
        let items = entries
            .into_iter()
            .map(|(r, id)| {
                GeomWithData::new(Rectangle::from_corners([r.xlo, r.ylo], [r.xhi, r.yhi]), id)
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Shapes touching or overlapping `rect`.
    pub fn intersecting(&self, rect: &Rect) -> Vec<ShapeId> {
        self.tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|e| e.data)
            .collect()
    }

    /// Number of shapes covering `p`, boundary included.
    pub fn count_at(&self, p: Point) -> usize {
        self.tree.locate_all_at_point(&corner(p)).count()
    }
}
