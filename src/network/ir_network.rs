//! Extraction of one supply net into a resistive network.

use std::collections::BTreeMap;
use std::time::Instant;

use itertools::Itertools;
use log::{debug, info, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use super::connection::Connection;
use super::node::{Node, NodeId, NodeKind};
use super::shape::{Shape, ShapeId};
use super::spatial::{NodeTree, ShapeTree};
use crate::design::{Design, InstId, LayerId, NetId, SigType, Wire};
use crate::error::{PdnError, Result};
use crate::geom::{decompose, Point, Rect};

/// Default upper bound on the node pitch, in microns.
pub const DEFAULT_MIN_NODE_PITCH_UM: f64 = 10.0;

/// Default multiple of a layer's routing pitch used as its node pitch.
pub const DEFAULT_NODE_PITCH_MULTIPLIER: i64 = 2;

/// Configuration for network extraction.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Global cap on the node pitch, in microns.
    pub min_node_pitch_um: f64,
    /// Node pitch as a multiple of the layer's routing pitch.
    pub node_pitch_multiplier: i64,
    /// Model every via as a single node pair regardless of size.
    pub single_via: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_node_pitch_um: DEFAULT_MIN_NODE_PITCH_UM,
            node_pitch_multiplier: DEFAULT_NODE_PITCH_MULTIPLIER,
            single_via: false,
        }
    }
}

impl NetworkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global node pitch cap (in microns).
    pub fn with_min_node_pitch_um(mut self, pitch: f64) -> Self {
        self.min_node_pitch_um = pitch;
        self
    }

    /// Set the routing pitch multiplier.
    pub fn with_node_pitch_multiplier(mut self, multiplier: i64) -> Self {
        self.node_pitch_multiplier = multiplier;
        self
    }

    /// Collapse every via to one node pair.
    pub fn with_single_via(mut self, single_via: bool) -> Self {
        self.single_via = single_via;
        self
    }
}

/// The resistive network of one supply net.
///
/// Nodes live in one arena indexed by [`NodeId`]. After [`IrNetwork::construct`]
/// the arena is sorted by node key, every per-layer list is sorted, and the
/// connection list holds no stubs, loops, invalid or parallel duplicates.
#[derive(Debug)]
pub struct IrNetwork<'d> {
    design: &'d Design,
    net: NetId,
    config: NetworkConfig,
    floorplanning: bool,
    nodes: Vec<Node>,
    layer_nodes: BTreeMap<LayerId, Vec<NodeId>>,
    shapes: BTreeMap<LayerId, Vec<Shape>>,
    iterm_nodes: Vec<NodeId>,
    bpin_nodes: Vec<NodeId>,
    connections: Vec<Connection>,
}

impl<'d> IrNetwork<'d> {
    /// Create an empty network for a supply net. Call [`construct`](Self::construct)
    /// to extract it.
    pub fn new(design: &'d Design, net: NetId, config: NetworkConfig) -> Result<Self> {
        let n = design.net(net);
        if !n.sig_type.is_supply() {
            return Err(PdnError::NotSupplyNet { net: n.name.clone() });
        }

        Ok(Self {
            design,
            net,
            config,
            floorplanning: false,
            nodes: Vec::new(),
            layer_nodes: BTreeMap::new(),
            shapes: BTreeMap::new(),
            iterm_nodes: Vec::new(),
            bpin_nodes: Vec::new(),
            connections: Vec::new(),
        })
    }

    pub fn design(&self) -> &'d Design {
        self.design
    }

    pub fn net(&self) -> NetId {
        self.net
    }

    pub fn net_name(&self) -> &'d str {
        &self.design.net(self.net).name
    }

    pub fn sig_type(&self) -> SigType {
        self.design.net(self.net).sig_type
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn set_min_node_pitch_um(&mut self, pitch: f64) {
        self.config.min_node_pitch_um = pitch;
    }

    pub fn set_node_pitch_multiplier(&mut self, multiplier: i64) {
        self.config.node_pitch_multiplier = multiplier;
    }

    /// Whether the next construction only uses fixed instances.
    pub fn is_floorplanning(&self) -> bool {
        self.floorplanning
    }

    pub fn set_floorplanning(&mut self, floorplanning: bool) {
        self.floorplanning = floorplanning;
    }

    /// Node pitch of a layer in DBU: the global cap or the multiplied routing
    /// pitch, whichever is smaller. Layers without a pitch use the cap.
    pub fn node_pitch(&self, layer: LayerId) -> i64 {
        let cap = self.design.to_dbu(self.config.min_node_pitch_um);
        let pitch = self.design.tech.layer(layer).pitch;
        if pitch > 0 {
            cap.min(self.config.node_pitch_multiplier * pitch)
        } else {
            cap
        }
    }

    /// Drop all nodes, shapes and connections.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.layer_nodes.clear();
        self.shapes.clear();
        self.iterm_nodes.clear();
        self.bpin_nodes.clear();
        self.connections.clear();
    }

    /// Build the network from the design, replacing any previous contents.
    pub fn construct(&mut self) {
        let start = Instant::now();
        self.reset();

        self.generate_routing_layer_shapes_and_nodes();
        self.generate_cut_layer_nodes();
        self.generate_top_layer_filler_nodes();

        self.sort_nodes();
        self.sort_shapes();

        self.cleanup_nodes();
        self.cleanup_connections();

        self.connect_layer_nodes();

        self.sort_connections();
        self.cleanup_connections();
        self.compact();
        self.sort_connections();

        debug!(
            "{}: {} shapes, {} nodes, {} connections",
            self.net_name(),
            self.shape_count(),
            self.node_count(true),
            self.connections.len()
        );
        trace!("{}: network construction took {:?}", self.net_name(), start.elapsed());
    }

    fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn add_layer_node(&mut self, node: Node) -> NodeId {
        let id = self.add_node(node);
        self.layer_nodes.entry(node.layer()).or_default().push(id);
        id
    }

    /// Shapes from wires, via enclosures and pins, seeded with nodes at
    /// shape intersections and centers. Pin anchors are created here too.
    fn generate_routing_layer_shapes_and_nodes(&mut self) {
        let design = self.design;
        let tech = &design.tech;
        let net = design.net(self.net);

        let mut layer_rects: BTreeMap<LayerId, Vec<Rect>> = BTreeMap::new();
        let mut terminals: BTreeMap<LayerId, Vec<Point>> = BTreeMap::new();

        for wire in &net.wires {
            match wire {
                Wire::Segment { layer, rect } => {
                    if tech.layer(*layer).is_routing() {
                        layer_rects.entry(*layer).or_default().push(*rect);
                    }
                }
                Wire::Via { via, origin } => {
                    for (layer, rect) in design.via(*via).enclosure_shapes(*origin) {
                        if tech.layer(layer).is_routing() {
                            layer_rects.entry(layer).or_default().push(rect);
                        }
                    }
                }
            }
        }

        let Some(bottom) = tech.routing_layer(1) else {
            return;
        };

        let mut deferred = false;
        for &iterm in &net.iterms {
            let inst = design.instance(iterm.inst);
            if !inst.status.is_placed() {
                continue;
            }
            if self.floorplanning && !inst.status.is_fixed() {
                deferred = true;
                continue;
            }

            let pin_shapes = design.iterm_shapes(iterm);
            if pin_shapes.is_empty() {
                continue;
            }

            let count = pin_shapes.len() as i64;
            let (sum_x, sum_y) = pin_shapes.iter().fold((0, 0), |(x, y), (_, rect)| {
                let c = rect.center();
                (x + c.x, y + c.y)
            });
            let anchor = self.add_node(Node::iterm(Point::new(sum_x / count, sum_y / count), bottom, iterm));
            self.iterm_nodes.push(anchor);

            for (layer, rect) in pin_shapes {
                let center = rect.center();
                let terminal = self.add_layer_node(Node::terminal(center, layer, rect));
                self.connections.push(Connection::term(anchor, terminal));
                terminals.entry(layer).or_default().push(center);
                layer_rects.entry(layer).or_default().push(rect);
            }
        }
        if self.floorplanning && !deferred {
            debug!("{}: all instances are fixed, leaving floorplanning mode", net.name);
            self.floorplanning = false;
        }

        for &pin in &net.bpins {
            let bpin = design.bpin(pin);
            if !bpin.placed {
                debug!("{}: skipping unplaced block pin {}", net.name, bpin.name);
                continue;
            }
            for &(layer, rect) in bpin.boxes.iter().unique() {
                if !tech.layer(layer).is_routing() {
                    continue;
                }
                let center = rect.center();
                let terminal = self.add_layer_node(Node::terminal(center, layer, rect));
                let anchor = self.add_node(Node::bpin(center, layer, pin, rect));
                self.bpin_nodes.push(anchor);
                self.connections.push(Connection::term(anchor, terminal));
                terminals.entry(layer).or_default().push(center);
                layer_rects.entry(layer).or_default().push(rect);
            }
        }

        for (layer, rects) in layer_rects {
            let pieces = decompose(&rects, tech.layer(layer).direction);
            let index = ShapeTree::new(pieces.iter().enumerate().map(|(i, r)| (*r, ShapeId(i))));
            let layer_terminals = terminals.remove(&layer).unwrap_or_default();

            let mut shapes = Vec::with_capacity(pieces.len());
            for (i, rect) in pieces.iter().enumerate() {
                let neighbours = index
                    .intersecting(rect)
                    .into_iter()
                    .filter(|other| other.0 > i)
                    .sorted();
                for other in neighbours {
                    if let Some(overlap) = rect.intersection(&pieces[other.0]) {
                        self.add_layer_node(Node::new(overlap.center(), layer));
                    }
                }
                self.add_layer_node(Node::new(rect.center(), layer));

                let mut shape = Shape::new(layer, *rect);
                for p in layer_terminals.iter().filter(|p| rect.contains(**p)) {
                    shape.add_terminal(*p);
                }
                shapes.push(shape);
            }

            debug!(
                "{}: {} rectangles on {} decomposed into {} shapes",
                net.name,
                rects.len(),
                tech.layer(layer).name,
                shapes.len()
            );
            self.shapes.insert(layer, shapes);
        }
    }

    /// Node pairs for every via, joined by via connections.
    fn generate_cut_layer_nodes(&mut self) {
        let design = self.design;
        let tech = &design.tech;
        let mut vias = 0;
        let mut collapsed = 0;

        for wire in &design.net(self.net).wires {
            let Wire::Via { via, origin } = wire else {
                continue;
            };
            let def = design.via(*via);
            if !tech.layer(def.bottom).is_routing() || !tech.layer(def.top).is_routing() {
                debug!("via {} does not join two routing layers, skipped", def.name);
                continue;
            }

            let cut_layer = tech.layer(def.cut);
            let cuts: Vec<Rect> = def.cut_shapes(*origin).collect();
            let min_pitch = self.node_pitch(def.bottom).min(self.node_pitch(def.top));
            vias += 1;

            if cuts.is_empty() || self.config.single_via || def.bbox(*origin).max_dxdy() < 2 * min_pitch {
                let total = cuts.iter().map(|c| cut_layer.effective_cuts(c)).sum::<u32>().max(1);
                self.add_via(*origin, def.bottom, def.top, def.cut, total);
                collapsed += 1;
            } else {
                for cut in &cuts {
                    self.add_via(cut.center(), def.bottom, def.top, def.cut, cut_layer.effective_cuts(cut));
                }
            }
        }

        debug!("{}: {} vias, {} collapsed to one node pair", self.net_name(), vias, collapsed);
    }

    fn add_via(&mut self, point: Point, bottom: LayerId, top: LayerId, cut: LayerId, cuts: u32) {
        let lower = self.add_layer_node(Node::new(point, bottom));
        let upper = self.add_layer_node(Node::new(point, top));
        self.connections.push(Connection::via(lower, upper, cut, cuts));
    }

    /// Evenly spaced nodes on the top layer so sources have places to land.
    fn generate_top_layer_filler_nodes(&mut self) {
        let Some(top) = self.top_layer() else {
            return;
        };
        let pitch = self.node_pitch(top);
        let index = self.node_index(top);

        let fillers: Vec<Point> = self
            .shapes(top)
            .iter()
            .flat_map(|shape| shape.create_filler_nodes(pitch, &index))
            .collect();
        debug!("{}: {} filler nodes on the top layer", self.net_name(), fillers.len());

        for point in fillers {
            self.add_layer_node(Node::new(point, top));
        }
    }

    fn sort_nodes(&mut self) {
        let nodes = &self.nodes;
        for ids in self.layer_nodes.values_mut() {
            ids.sort_by_key(|id| nodes[id.0]);
        }
        self.iterm_nodes.sort_by_key(|id| nodes[id.0]);
        self.bpin_nodes.sort_by_key(|id| nodes[id.0]);
    }

    fn sort_shapes(&mut self) {
        let mut next = 0;
        for shapes in self.shapes.values_mut() {
            shapes.sort_by_key(|s| *s.rect());
            for shape in shapes.iter_mut() {
                shape.set_id(ShapeId(next));
                next += 1;
            }
        }
    }

    /// Merge coincident nodes, then let every shape thin out its nodes.
    fn cleanup_nodes(&mut self) {
        let before = self.node_count(false);
        let pitches: BTreeMap<LayerId, i64> = self
            .layer_nodes
            .keys()
            .map(|&layer| (layer, self.node_pitch(layer)))
            .collect();

        let Self {
            nodes,
            layer_nodes,
            shapes,
            connections,
            ..
        } = self;
        let nodes: &[Node] = nodes;

        let mut node_connections: FxHashMap<NodeId, Vec<usize>> = FxHashMap::default();
        for (index, connection) in connections.iter().enumerate() {
            for end in [connection.node0(), connection.node1()].into_iter().flatten() {
                node_connections.entry(end).or_default().push(index);
            }
        }
        let mut copy = |keep: NodeId, gone: NodeId| {
            if let Some(moved) = node_connections.remove(&gone) {
                for &index in &moved {
                    connections[index].change_node(gone, keep);
                }
                node_connections.entry(keep).or_default().extend(moved);
            }
        };

        let mut removed: FxHashSet<NodeId> = FxHashSet::default();

        // Lists are sorted, so nodes at the same point are adjacent.
        for ids in layer_nodes.values() {
            let mut survivor: Option<NodeId> = None;
            for &id in ids {
                match survivor {
                    Some(keep) if nodes[keep.0].point() == nodes[id.0].point() => {
                        copy(keep, id);
                        removed.insert(id);
                    }
                    _ => survivor = Some(id),
                }
            }
        }
        let duplicates = removed.len();

        for (layer, ids) in layer_nodes.iter() {
            let Some(layer_shapes) = shapes.get(layer) else {
                continue;
            };
            let live: Vec<NodeId> = ids.iter().filter(|id| !removed.contains(id)).copied().collect();
            let index = NodeTree::new(live.iter().map(|id| (nodes[id.0].point(), *id)));
            let shape_index = ShapeTree::new(layer_shapes.iter().map(|s| (*s.rect(), s.id())));
            let shared: FxHashSet<NodeId> = live
                .iter()
                .filter(|id| shape_index.count_at(nodes[id.0].point()) > 1)
                .copied()
                .collect();

            let min_distance = pitches.get(layer).copied().unwrap_or(0);
            for shape in layer_shapes {
                let members = index.in_rect(shape.rect());
                shape.cleanup_nodes(min_distance, &members, nodes, &shared, &mut removed, &mut copy);
            }
        }

        for ids in layer_nodes.values_mut() {
            ids.retain(|id| !removed.contains(id));
        }

        debug!(
            "node cleanup: {} -> {} ({} coincident, {} merged)",
            before,
            before - removed.len(),
            duplicates,
            removed.len() - duplicates
        );
    }

    /// Drop stubs, loops and invalid connections and merge parallel ones.
    fn cleanup_connections(&mut self) {
        let before = self.connections.len();
        let nodes = &self.nodes;

        let mut kept: Vec<Connection> = Vec::with_capacity(before);
        let mut by_pair: FxHashMap<(NodeId, NodeId), usize> = FxHashMap::default();
        let mut dropped = 0;

        for mut connection in std::mem::take(&mut self.connections) {
            if connection.is_stub() || connection.is_loop() || !connection.is_valid() {
                dropped += 1;
                continue;
            }
            connection.ensure_node_order(nodes);
            let Some(pair) = connection.endpoints() else {
                continue;
            };

            match by_pair.get(&pair) {
                Some(&index) => {
                    if !kept[index].merge_with(&connection) {
                        trace!("dropping {:?} parallel to {:?}", connection.kind(), kept[index].kind());
                    }
                }
                None => {
                    by_pair.insert(pair, kept.len());
                    kept.push(connection);
                }
            }
        }

        debug!(
            "connection cleanup: {} -> {} ({} invalid)",
            before,
            kept.len(),
            dropped
        );
        self.connections = kept;
    }

    /// Let every shape wire up the nodes inside it.
    fn connect_layer_nodes(&mut self) {
        let mut added = Vec::new();
        for (layer, ids) in &self.layer_nodes {
            let Some(shapes) = self.shapes.get(layer) else {
                continue;
            };
            let index = NodeTree::new(ids.iter().map(|id| (self.nodes[id.0].point(), *id)));
            for shape in shapes {
                added.extend(shape.connect_nodes(&self.nodes, &index.in_rect(shape.rect())));
            }
        }
        debug!("{}: {} layer connections", self.net_name(), added.len());
        self.connections.extend(added);
    }

    fn sort_connections(&mut self) {
        let nodes = &self.nodes;
        self.connections.sort_by_key(|c| {
            (
                c.node0().map(|n| nodes[n.0]),
                c.node1().map(|n| nodes[n.0]),
                *c.kind(),
            )
        });
    }

    /// Rebuild the arena with only live nodes, in key order.
    fn compact(&mut self) {
        let mut live: Vec<NodeId> = self
            .layer_nodes
            .values()
            .flatten()
            .chain(&self.iterm_nodes)
            .chain(&self.bpin_nodes)
            .copied()
            .collect();
        live.sort_by_key(|id| self.nodes[id.0]);
        live.dedup();

        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let nodes: Vec<Node> = live
            .iter()
            .enumerate()
            .map(|(new, old)| {
                remap[old.0] = Some(NodeId(new));
                self.nodes[old.0]
            })
            .collect();

        let renumber = |ids: &mut Vec<NodeId>| {
            *ids = ids.iter().filter_map(|id| remap[id.0]).collect();
        };
        for ids in self.layer_nodes.values_mut() {
            renumber(ids);
        }
        renumber(&mut self.iterm_nodes);
        renumber(&mut self.bpin_nodes);

        self.connections = self
            .connections
            .iter()
            .filter_map(|c| {
                let (a, b) = c.endpoints()?;
                Some(Connection::new(remap[a.0]?, remap[b.0]?, *c.kind()))
            })
            .collect();
        self.layer_nodes.retain(|_, ids| !ids.is_empty());
        self.nodes = nodes;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Layers that carry nodes, bottom first.
    pub fn layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layer_nodes.keys().copied()
    }

    pub fn layer_nodes(&self, layer: LayerId) -> &[NodeId] {
        self.layer_nodes.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn shapes(&self, layer: LayerId) -> &[Shape] {
        self.shapes.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn iterm_nodes(&self) -> &[NodeId] {
        &self.iterm_nodes
    }

    pub fn bpin_nodes(&self) -> &[NodeId] {
        &self.bpin_nodes
    }

    /// Highest routing layer with shapes on this net.
    pub fn top_layer(&self) -> Option<LayerId> {
        self.shapes.keys().next_back().copied()
    }

    pub fn bottom_layer(&self) -> Option<LayerId> {
        self.shapes.keys().next().copied()
    }

    pub fn top_layer_nodes(&self) -> &[NodeId] {
        match self.top_layer() {
            Some(top) => self.layer_nodes(top),
            None => &[],
        }
    }

    /// Number of nodes, optionally counting pin anchors.
    pub fn node_count(&self, include_pin_anchors: bool) -> usize {
        let grid: usize = self.layer_nodes.values().map(Vec::len).sum();
        if include_pin_anchors {
            grid + self.iterm_nodes.len() + self.bpin_nodes.len()
        } else {
            grid
        }
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Point index over one layer's nodes.
    pub fn node_index(&self, layer: LayerId) -> NodeTree {
        NodeTree::new(self.layer_nodes(layer).iter().map(|id| (self.nodes[id.0].point(), *id)))
    }

    /// Grid nodes covered by block pin boxes, with the box that covers them.
    pub fn bpin_shape_nodes(&self) -> BTreeMap<NodeId, Rect> {
        let mut found = BTreeMap::new();
        for &anchor in &self.bpin_nodes {
            let node = &self.nodes[anchor.0];
            let NodeKind::BPin { shape, .. } = *node.kind() else {
                continue;
            };
            for id in self.node_index(node.layer()).in_rect(&shape) {
                found.entry(id).or_insert(shape);
            }
        }
        found
    }

    /// Pin anchor nodes of every connected instance.
    pub fn instance_node_mapping(&self) -> BTreeMap<InstId, Vec<NodeId>> {
        let mut mapping: BTreeMap<InstId, Vec<NodeId>> = BTreeMap::new();
        for &id in &self.iterm_nodes {
            if let Some(iterm) = self.nodes[id.0].iterm_id() {
                mapping.entry(iterm.inst).or_default().push(id);
            }
        }
        mapping
    }

    /// Connection indices incident to every node.
    pub fn node_connections(&self) -> Vec<Vec<usize>> {
        let mut incident = vec![Vec::new(); self.nodes.len()];
        for (index, connection) in self.connections.iter().enumerate() {
            if let Some((a, b)) = connection.endpoints() {
                incident[a.0].push(index);
                incident[b.0].push(index);
            }
        }
        incident
    }

    /// Log shape and node counts per layer.
    pub fn report_stats(&self) {
        let tech = &self.design.tech;
        info!("Network statistics for {}:", self.net_name());
        for layer in self.layers() {
            info!(
                "  {:<10} shapes: {:>7}  nodes: {:>9}",
                tech.layer(layer).name,
                self.shapes(layer).len(),
                self.layer_nodes(layer).len()
            );
        }
        info!(
            "  total      shapes: {:>7}  nodes: {:>9}  iterms: {}  bpins: {}  connections: {}",
            self.shape_count(),
            self.node_count(false),
            self.iterm_nodes.len(),
            self.bpin_nodes.len(),
            self.connections.len()
        );
    }
}
