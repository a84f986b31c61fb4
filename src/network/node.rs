//! Grid nodes.

use std::fmt;

use crate::design::{BPinId, ITermId, LayerId, Tech};
use crate::geom::{Point, Rect};

/// Index of a node in the network arena.
///
/// After construction the arena is sorted, so comparing ids compares the
/// nodes' canonical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a node stands for.
///
/// The variant order is part of the canonical node key: at the same point a
/// plain node sorts before a terminal, which sorts before pin anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// Grid point on a wire
    Plain,
    /// Contact point anchored to a pin rectangle
    Terminal { shape: Rect },
    /// Anchor of an instance terminal; carries the load current
    ITerm { iterm: ITermId },
    /// Anchor of a block pin box
    BPin { pin: BPinId, shape: Rect },
    /// External supply attached to a real node
    Source { target: NodeId, shape: Rect },
}

/// A point on a tech layer.
///
/// Field order defines the derived ordering: layer, then point, then kind.
/// This is the canonical node key and is a strict total order over the
/// nodes of one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    layer: LayerId,
    point: Point,
    kind: NodeKind,
}

impl Node {
    pub fn new(point: Point, layer: LayerId) -> Self {
        Self {
            layer,
            point,
            kind: NodeKind::Plain,
        }
    }

    pub fn terminal(point: Point, layer: LayerId, shape: Rect) -> Self {
        Self {
            layer,
            point,
            kind: NodeKind::Terminal { shape },
        }
    }

    pub fn iterm(point: Point, layer: LayerId, iterm: ITermId) -> Self {
        Self {
            layer,
            point,
            kind: NodeKind::ITerm { iterm },
        }
    }

    pub fn bpin(point: Point, layer: LayerId, pin: BPinId, shape: Rect) -> Self {
        Self {
            layer,
            point,
            kind: NodeKind::BPin { pin, shape },
        }
    }

    /// A source wrapping `target`. It sits at the target's point and layer.
    pub fn source(target_id: NodeId, target: &Node, shape: Rect) -> Self {
        Self {
            layer: target.layer,
            point: target.point,
            kind: NodeKind::Source {
                target: target_id,
                shape,
            },
        }
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_iterm(&self) -> bool {
        matches!(self.kind, NodeKind::ITerm { .. })
    }

    pub fn is_bpin(&self) -> bool {
        matches!(self.kind, NodeKind::BPin { .. })
    }

    /// Pin anchors are not physical wire points.
    pub fn is_pin_anchor(&self) -> bool {
        self.is_iterm() || self.is_bpin()
    }

    pub fn iterm_id(&self) -> Option<ITermId> {
        match self.kind {
            NodeKind::ITerm { iterm } => Some(iterm),
            _ => None,
        }
    }

    /// The real node a source is attached to.
    pub fn source_target(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Source { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Netlist name: `<net>_<x>_<y>_<routing level>`.
    pub fn name(&self, net: &str, tech: &Tech) -> String {
        format!(
            "{}_{}_{}_{}",
            net,
            self.point.x,
            self.point.y,
            tech.layer(self.layer).routing_level
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NodeKind::Plain => "node",
            NodeKind::Terminal { .. } => "terminal",
            NodeKind::ITerm { .. } => "iterm",
            NodeKind::BPin { .. } => "bpin",
            NodeKind::Source { .. } => "source",
        };
        write!(f, "{} {} on {}", kind, self.point, self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::InstId;

    #[test]
    fn test_key_orders_layer_then_point_then_kind() {
        let p = Point::new(10, 20);
        let plain = Node::new(p, LayerId(2));
        let term = Node::terminal(p, LayerId(2), Rect::new(0, 0, 20, 40));
        let lower = Node::new(Point::new(100, 100), LayerId(0));
        let left = Node::new(Point::new(5, 900), LayerId(2));

        assert!(lower < left);
        assert!(left < plain);
        assert!(plain < term);
    }

    #[test]
    fn test_iterm_tiebreak_is_strict() {
        let p = Point::new(0, 0);
        let a = Node::iterm(p, LayerId(0), ITermId::new(InstId(0), 0));
        let b = Node::iterm(p, LayerId(0), ITermId::new(InstId(0), 1));
        assert!(a < b);
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_source_takes_target_location() {
        let target = Node::new(Point::new(7, 8), LayerId(4));
        let source = Node::source(NodeId(3), &target, Rect::new(0, 0, 10, 10));
        assert_eq!(source.point(), target.point());
        assert_eq!(source.layer(), target.layer());
        assert_eq!(source.source_target(), Some(NodeId(3)));
        assert!(!source.is_pin_anchor());
    }
}
