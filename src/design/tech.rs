//! Technology layers and cut-class rules.

use rustc_hash::FxHashMap;

use super::types::LayerId;
use crate::geom::{Direction, Rect};

/// Whether a layer carries wires or via cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Routing,
    Cut,
}

/// Maps a cut box size to the number of physical cuts it represents.
#[derive(Debug, Clone, PartialEq)]
pub struct CutClass {
    pub width: i64,
    /// Length is optional; when absent only the width has to match.
    pub length: Option<i64>,
    pub cuts: u32,
}

impl CutClass {
    fn matches(&self, dx: i64, dy: i64) -> bool {
        let fits = |w: i64, l: i64| w == self.width && self.length.map_or(true, |len| l == len);
        fits(dx, dy) || fits(dy, dx)
    }
}

/// A layer in the metal stack.
#[derive(Debug, Clone)]
pub struct TechLayer {
    pub name: String,
    pub kind: LayerKind,
    /// 1-based index among routing layers, 0 for cut layers.
    pub routing_level: usize,
    pub direction: Direction,
    /// Routing pitch in DBU (0 when unknown).
    pub pitch: i64,
    /// Default wire width in DBU.
    pub width: i64,
    /// Ohm per square for routing layers, ohm per cut for cut layers.
    pub resistance: f64,
    pub cut_classes: Vec<CutClass>,
}

impl TechLayer {
    pub fn routing(name: impl Into<String>, direction: Direction, pitch: i64, width: i64, resistance: f64) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Routing,
            routing_level: 0,
            direction,
            pitch,
            width,
            resistance,
            cut_classes: Vec::new(),
        }
    }

    pub fn cut(name: impl Into<String>, resistance: f64) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Cut,
            routing_level: 0,
            direction: Direction::None,
            pitch: 0,
            width: 0,
            resistance,
            cut_classes: Vec::new(),
        }
    }

    pub fn is_routing(&self) -> bool {
        self.kind == LayerKind::Routing
    }

    /// Number of cuts represented by a cut box on this layer.
    ///
    /// The first cut-class rule matching the box in either orientation wins;
    /// boxes matching no rule count as a single cut.
    pub fn effective_cuts(&self, cut: &Rect) -> u32 {
        self.cut_classes
            .iter()
            .find(|class| class.matches(cut.dx(), cut.dy()))
            .map_or(1, |class| class.cuts)
    }
}

/// The layer stack, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct Tech {
    layers: Vec<TechLayer>,
    by_name: FxHashMap<String, LayerId>,
}

impl Tech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer on top of the stack. Routing levels are assigned here.
    pub fn add_layer(&mut self, mut layer: TechLayer) -> LayerId {
        let id = LayerId(self.layers.len());
        if layer.is_routing() {
            layer.routing_level = self.layers.iter().filter(|l| l.is_routing()).count() + 1;
        }
        self.by_name.insert(layer.name.clone(), id);
        self.layers.push(layer);
        id
    }

    pub fn layer(&self, id: LayerId) -> &TechLayer {
        &self.layers[id.0]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut TechLayer {
        &mut self.layers[id.0]
    }

    pub fn find_layer(&self, name: &str) -> Option<LayerId> {
        self.by_name.get(name).copied()
    }

    /// Routing layer by 1-based routing level.
    pub fn routing_layer(&self, level: usize) -> Option<LayerId> {
        self.layers
            .iter()
            .position(|l| l.is_routing() && l.routing_level == level)
            .map(LayerId)
    }

    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &TechLayer)> {
        self.layers.iter().enumerate().map(|(i, l)| (LayerId(i), l))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_levels_skip_cuts() {
        let mut tech = Tech::new();
        let m1 = tech.add_layer(TechLayer::routing("M1", Direction::Horizontal, 200, 100, 0.1));
        let v1 = tech.add_layer(TechLayer::cut("V1", 2.0));
        let m2 = tech.add_layer(TechLayer::routing("M2", Direction::Vertical, 400, 200, 0.05));

        assert_eq!(tech.layer(m1).routing_level, 1);
        assert_eq!(tech.layer(v1).routing_level, 0);
        assert_eq!(tech.layer(m2).routing_level, 2);
        assert_eq!(tech.routing_layer(2), Some(m2));
        assert_eq!(tech.find_layer("V1"), Some(v1));
        assert!(m1 < v1 && v1 < m2);
    }

    #[test]
    fn test_effective_cuts() {
        let mut layer = TechLayer::cut("V1", 2.0);
        layer.cut_classes.push(CutClass { width: 100, length: Some(300), cuts: 2 });
        layer.cut_classes.push(CutClass { width: 50, length: None, cuts: 1 });

        assert_eq!(layer.effective_cuts(&Rect::new(0, 0, 100, 300)), 2);
        // rotated box matches the same class
        assert_eq!(layer.effective_cuts(&Rect::new(0, 0, 300, 100)), 2);
        assert_eq!(layer.effective_cuts(&Rect::new(0, 0, 100, 100)), 1);
    }
}
