//! Resistive connections between nodes.

use rustc_hash::FxHashMap;

use super::node::{Node, NodeId};
use crate::design::LayerId;

/// Resistance of a terminal link, in ohms.
pub const TERM_RESISTANCE: f64 = 1e-4;

/// Per-layer resistance: ohm per square for routing layers, ohm per cut for
/// cut layers.
pub type ResistanceMap = FxHashMap<LayerId, f64>;

/// The physical element a connection models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionKind {
    /// Wire segment. Resistance is `length / width` squares.
    Layer { layer: LayerId, length: i64, width: i64 },
    /// Via stack on a cut layer, with the number of parallel cuts.
    Via { layer: LayerId, cuts: u32 },
    /// Near-zero link between a pin anchor and its terminal.
    Term,
}

/// An edge between two nodes.
///
/// A missing endpoint marks a stub. After [`Connection::ensure_node_order`]
/// the endpoints are ordered by node key.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    nodes: [Option<NodeId>; 2],
    kind: ConnectionKind,
}

impl Connection {
    pub fn new(node0: NodeId, node1: NodeId, kind: ConnectionKind) -> Self {
        Self {
            nodes: [Some(node0), Some(node1)],
            kind,
        }
    }

    pub fn layer(node0: NodeId, node1: NodeId, layer: LayerId, length: i64, width: i64) -> Self {
        Self::new(node0, node1, ConnectionKind::Layer { layer, length, width })
    }

    pub fn via(node0: NodeId, node1: NodeId, layer: LayerId, cuts: u32) -> Self {
        Self::new(node0, node1, ConnectionKind::Via { layer, cuts })
    }

    pub fn term(node0: NodeId, node1: NodeId) -> Self {
        Self::new(node0, node1, ConnectionKind::Term)
    }

    pub fn node0(&self) -> Option<NodeId> {
        self.nodes[0]
    }

    pub fn node1(&self) -> Option<NodeId> {
        self.nodes[1]
    }

    /// Both endpoints, if the connection is not a stub.
    pub fn endpoints(&self) -> Option<(NodeId, NodeId)> {
        Some((self.nodes[0]?, self.nodes[1]?))
    }

    pub fn kind(&self) -> &ConnectionKind {
        &self.kind
    }

    pub fn has_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&Some(node))
    }

    /// The endpoint opposite `node`, or `None` if `node` is not an endpoint.
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        match self.nodes {
            [Some(a), b] if a == node => b,
            [a, Some(b)] if b == node => a,
            _ => None,
        }
    }

    /// Redirect every endpoint equal to `from` to `to`.
    pub fn change_node(&mut self, from: NodeId, to: NodeId) {
        for end in self.nodes.iter_mut() {
            if *end == Some(from) {
                *end = Some(to);
            }
        }
    }

    /// Resistance in ohms. Layers missing from `resistance` count as zero.
    pub fn resistance(&self, resistance: &ResistanceMap) -> f64 {
        match self.kind {
            ConnectionKind::Layer { layer, length, width } => {
                let sheet = resistance.get(&layer).copied().unwrap_or(0.0);
                sheet * length as f64 / width as f64
            }
            ConnectionKind::Via { layer, cuts } => {
                let per_cut = resistance.get(&layer).copied().unwrap_or(0.0);
                per_cut / cuts as f64
            }
            ConnectionKind::Term => TERM_RESISTANCE,
        }
    }

    /// Conductance in siemens; a zero resistance maps to infinity.
    pub fn conductance(&self, resistance: &ResistanceMap) -> f64 {
        let r = self.resistance(resistance);
        if r == 0.0 {
            f64::INFINITY
        } else {
            1.0 / r
        }
    }

    /// Whether the geometry describes a positive resistance.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            ConnectionKind::Layer { length, width, .. } => length > 0 && width > 0,
            ConnectionKind::Via { cuts, .. } => cuts > 0,
            ConnectionKind::Term => true,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.nodes, [Some(a), Some(b)] if a == b)
    }

    pub fn is_stub(&self) -> bool {
        self.nodes.iter().any(Option::is_none)
    }

    /// Combine a parallel connection into this one.
    ///
    /// Wire segments on the same layer add their widths, vias on the same cut
    /// layer add their cuts. Returns `false` and leaves `self` unchanged when
    /// the two cannot be combined.
    pub fn merge_with(&mut self, other: &Connection) -> bool {
        if self.endpoints().is_none() || self.endpoints() != other.endpoints() {
            return false;
        }

        match (&mut self.kind, &other.kind) {
            (
                ConnectionKind::Layer { layer, width, length },
                ConnectionKind::Layer {
                    layer: other_layer,
                    width: other_width,
                    length: other_length,
                },
            ) if layer == other_layer => {
                *width += other_width;
                *length = (*length).max(*other_length);
                true
            }
            (
                ConnectionKind::Via { layer, cuts },
                ConnectionKind::Via {
                    layer: other_layer,
                    cuts: other_cuts,
                },
            ) if layer == other_layer => {
                *cuts += other_cuts;
                true
            }
            (ConnectionKind::Term, ConnectionKind::Term) => true,
            _ => false,
        }
    }

    /// Put the endpoint with the smaller node key first.
    pub fn ensure_node_order(&mut self, nodes: &[Node]) {
        if let [Some(a), Some(b)] = self.nodes {
            if nodes[b.0] < nodes[a.0] {
                self.nodes.swap(0, 1);
            }
        }
    }
}
