//! Wire shapes: one maximal rectangle of metal on one layer.

use std::fmt;

use rustc_hash::FxHashSet;

use super::connection::Connection;
use super::node::{Node, NodeId};
use super::spatial::NodeTree;
use crate::design::LayerId;
use crate::geom::{Point, Rect};

/// Index of a shape, assigned after shapes are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub usize);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A rectangle of metal owning the nodes that lie inside it.
///
/// Node membership is geometric: the network passes in the ids of the nodes
/// found inside [`Shape::rect`] on the shape's layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    id: ShapeId,
    layer: LayerId,
    rect: Rect,
    terminals: Vec<Point>,
}

impl Shape {
    pub fn new(layer: LayerId, rect: Rect) -> Self {
        Self {
            id: ShapeId(0),
            layer,
            rect,
            terminals: Vec::new(),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ShapeId) {
        self.id = id;
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn add_terminal(&mut self, point: Point) {
        if !self.terminals.contains(&point) {
            self.terminals.push(point);
        }
    }

    /// Shapes at least as wide as they are tall run horizontally.
    pub fn is_horizontal(&self) -> bool {
        self.rect.dx() >= self.rect.dy()
    }

    /// Whether `p` lies on the shape's central x or central y line.
    pub fn is_center_line(&self, p: Point) -> bool {
        let center = self.rect.center();
        p.x == center.x || p.y == center.y
    }

    /// Length and width of a wire segment between two points on this shape.
    ///
    /// The length runs along the dominant axis and the width is the shape's
    /// span across it. Points stacked across the shape (same position along
    /// the dominant axis) are joined across it instead.
    fn segment(&self, a: Point, b: Point) -> (i64, i64) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        let (along, across, span_along, span_across) = if self.is_horizontal() {
            (dx, dy, self.rect.dx(), self.rect.dy())
        } else {
            (dy, dx, self.rect.dy(), self.rect.dx())
        };

        if along > 0 {
            (along, span_across)
        } else {
            (across, span_along)
        }
    }

    /// Wire this shape's nodes into a connected subgraph.
    ///
    /// Nodes are visited in key order; each is linked to the nearest node not
    /// yet visited, ties going to the smaller key.
    pub fn connect_nodes(&self, nodes: &[Node], ids: &[NodeId]) -> Vec<Connection> {
        let mut order = ids.to_vec();
        order.sort_by_key(|id| nodes[id.0]);
        order.dedup();

        let mut tree = NodeTree::new(order.iter().map(|id| (nodes[id.0].point(), *id)));
        let mut connections = Vec::with_capacity(order.len().saturating_sub(1));

        for &id in &order {
            let point = nodes[id.0].point();
            tree.remove(point, id);

            let Some(next) = tree.nearest(point).into_iter().min_by_key(|n| nodes[n.0]) else {
                break;
            };
            let (length, width) = self.segment(point, nodes[next.0].point());
            connections.push(Connection::layer(id, next, self.layer, length, width));
        }

        connections
    }

    /// Fold nodes closer than `min_distance / 2` into their neighbours.
    ///
    /// Anchors (nodes in `shared` or on a pin terminal) are processed first
    /// and are never removed, then center-line nodes, then the rest. For each
    /// removed node `merge(survivor, removed)` is called so the caller can
    /// move its connections. Removed nodes are added to `removed` and
    /// returned.
    pub fn cleanup_nodes<F>(
        &self,
        min_distance: i64,
        ids: &[NodeId],
        nodes: &[Node],
        shared: &FxHashSet<NodeId>,
        removed: &mut FxHashSet<NodeId>,
        mut merge: F,
    ) -> Vec<NodeId>
    where
        F: FnMut(NodeId, NodeId),
    {
        let radius = min_distance / 2;
        if radius <= 0 {
            return Vec::new();
        }

        let mut live: Vec<NodeId> = ids.iter().filter(|id| !removed.contains(id)).copied().collect();
        live.sort_by_key(|id| nodes[id.0]);
        live.dedup();

        let is_anchor = |id: &NodeId| shared.contains(id) || self.terminals.contains(&nodes[id.0].point());
        let (anchors, rest): (Vec<NodeId>, Vec<NodeId>) = live.iter().partition(|id| is_anchor(id));
        let (center, other): (Vec<NodeId>, Vec<NodeId>) =
            rest.into_iter().partition(|id| self.is_center_line(nodes[id.0].point()));

        let tree = NodeTree::new(live.iter().map(|id| (nodes[id.0].point(), *id)));
        let mut processed = FxHashSet::default();
        let mut victims = Vec::new();

        for id in anchors.into_iter().chain(center).chain(other) {
            if removed.contains(&id) {
                continue;
            }
            processed.insert(id);

            let mut near = tree.within(nodes[id.0].point(), radius);
            near.sort_by_key(|n| nodes[n.0]);
            for n in near {
                if n == id || removed.contains(&n) || processed.contains(&n) || is_anchor(&n) {
                    continue;
                }
                merge(id, n);
                removed.insert(n);
                victims.push(n);
            }
        }

        victims
    }

    /// Evenly spaced points along the center line, `max_distance` apart,
    /// skipping positions that already have an indexed node within half a
    /// step along the shape.
    pub fn create_filler_nodes(&self, max_distance: i64, index: &NodeTree) -> Vec<Point> {
        if max_distance <= 0 {
            return Vec::new();
        }

        let half = max_distance / 2;
        let center = self.rect.center();
        let (lo, hi) = if self.is_horizontal() {
            (self.rect.xlo, self.rect.xhi)
        } else {
            (self.rect.ylo, self.rect.yhi)
        };

        let mut points = Vec::new();
        let mut pos = lo + half;
        while pos <= hi {
            let (point, window) = if self.is_horizontal() {
                (
                    Point::new(pos, center.y),
                    Rect::new(pos - half, self.rect.ylo, pos + half, self.rect.yhi),
                )
            } else {
                (
                    Point::new(center.x, pos),
                    Rect::new(self.rect.xlo, pos - half, self.rect.xhi, pos + half),
                )
            };
            if !index.any_in_rect(&window) {
                points.push(point);
            }
            pos += max_distance;
        }

        points
    }
}
