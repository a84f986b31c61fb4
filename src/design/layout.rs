//! Physical design database.

use rustc_hash::FxHashMap;

use super::power::PowerTable;
use super::tech::{CutClass, Tech, TechLayer};
use super::types::{BPinId, CornerId, ITermId, InstId, LayerId, NetId, ViaId};
use crate::dsl::{DesignAst, LayerType, PinShapeDef, RectDef};
use crate::error::{PdnError, Result};
use crate::geom::{Point, Rect};

/// Default database units per micron when `.units` is absent.
pub const DEFAULT_DBU_PER_MICRON: i64 = 1000;

/// Signal type of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigType {
    Power,
    Ground,
    Signal,
}

impl SigType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "power" | "vdd" => Some(Self::Power),
            "ground" | "gnd" | "vss" => Some(Self::Ground),
            "signal" => Some(Self::Signal),
            _ => None,
        }
    }

    pub fn is_supply(&self) -> bool {
        matches!(self, Self::Power | Self::Ground)
    }
}

/// Placement status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementStatus {
    Unplaced,
    Placed,
    Fixed,
}

impl PlacementStatus {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "unplaced" => Some(Self::Unplaced),
            "placed" => Some(Self::Placed),
            "fixed" | "firm" | "locked" => Some(Self::Fixed),
            _ => None,
        }
    }

    pub fn is_placed(&self) -> bool {
        !matches!(self, Self::Unplaced)
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed)
    }
}

/// A via definition with shapes relative to its origin.
#[derive(Debug, Clone)]
pub struct ViaDef {
    pub name: String,
    pub bottom: LayerId,
    pub cut: LayerId,
    pub top: LayerId,
    pub cuts: Vec<Rect>,
    pub enclosures: Vec<(LayerId, Rect)>,
}

impl ViaDef {
    /// Bounding box of all via shapes placed at `origin`.
    pub fn bbox(&self, origin: Point) -> Rect {
        self.cuts
            .iter()
            .chain(self.enclosures.iter().map(|(_, r)| r))
            .map(|r| r.translate(origin))
            .reduce(|a, b| a.merge(&b))
            .unwrap_or_else(|| Rect::new(origin.x, origin.y, origin.x, origin.y))
    }

    /// Enclosure shapes placed at `origin`.
    pub fn enclosure_shapes(&self, origin: Point) -> impl Iterator<Item = (LayerId, Rect)> + '_ {
        self.enclosures.iter().map(move |(layer, r)| (*layer, r.translate(origin)))
    }

    /// Cut boxes placed at `origin`.
    pub fn cut_shapes(&self, origin: Point) -> impl Iterator<Item = Rect> + '_ {
        self.cuts.iter().map(move |r| r.translate(origin))
    }
}

/// A piece of special wiring on a supply net.
#[derive(Debug, Clone)]
pub enum Wire {
    Segment { layer: LayerId, rect: Rect },
    Via { via: ViaId, origin: Point },
}

/// A net and the objects attached to it.
#[derive(Debug, Clone)]
pub struct Net {
    pub name: String,
    pub sig_type: SigType,
    pub wires: Vec<Wire>,
    pub iterms: Vec<ITermId>,
    pub bpins: Vec<BPinId>,
}

/// Pin geometry of an instance terminal, in absolute coordinates.
#[derive(Debug, Clone)]
pub enum PinGeometry {
    Box { layer: LayerId, rect: Rect },
    Via { via: ViaId, origin: Point },
}

/// A pin of an instance and the net it is tied to.
#[derive(Debug, Clone)]
pub struct InstPin {
    pub name: String,
    pub net: NetId,
    pub geometry: Vec<PinGeometry>,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub bbox: Rect,
    pub status: PlacementStatus,
    pub is_pad: bool,
    pub pins: Vec<InstPin>,
}

/// A block pin with one or more boxes.
#[derive(Debug, Clone)]
pub struct BPin {
    pub name: String,
    pub net: NetId,
    pub placed: bool,
    pub boxes: Vec<(LayerId, Rect)>,
}

/// An analysis corner.
#[derive(Debug, Clone)]
pub struct Corner {
    pub name: String,
    /// Operating-condition supply voltage
    pub voltage: Option<f64>,
}

/// A complete design ready for analysis.
#[derive(Debug, Clone)]
pub struct Design {
    pub name: String,
    pub dbu_per_micron: i64,
    pub die: Rect,
    pub core: Rect,
    pub tech: Tech,
    pub vias: Vec<ViaDef>,
    pub nets: Vec<Net>,
    pub instances: Vec<Instance>,
    pub bpins: Vec<BPin>,
    pub corners: Vec<Corner>,
    pub power: PowerTable,
}

impl Design {
    /// Build a design from a parsed AST.
    pub fn from_ast(ast: DesignAst) -> Result<Self> {
        let dbu_per_micron = ast.units.map_or(DEFAULT_DBU_PER_MICRON, |u| u.round() as i64);
        let to_dbu = |um: f64| (um * dbu_per_micron as f64).round() as i64;
        let to_rect = |r: &RectDef| Rect::new(to_dbu(r[0]), to_dbu(r[1]), to_dbu(r[2]), to_dbu(r[3]));
        let to_point = |p: &[f64; 2]| Point::new(to_dbu(p[0]), to_dbu(p[1]));

        // Layers
        let mut tech = Tech::new();
        for def in &ast.layers {
            if tech.find_layer(&def.name).is_some() {
                return Err(duplicate("layer", &def.name, def.line));
            }
            let layer = match def.layer_type {
                LayerType::Routing => {
                    TechLayer::routing(&def.name, def.direction, to_dbu(def.pitch), to_dbu(def.width), def.resistance)
                }
                LayerType::Cut => TechLayer::cut(&def.name, def.resistance),
            };
            tech.add_layer(layer);
        }
        let find_layer = |tech: &Tech, name: &str, line: usize| {
            tech.find_layer(name).ok_or_else(|| PdnError::UnknownLayer {
                name: name.to_string(),
                line,
            })
        };

        for def in &ast.cut_classes {
            let layer = find_layer(&tech, &def.layer, def.line)?;
            tech.layer_mut(layer).cut_classes.push(CutClass {
                width: to_dbu(def.width),
                length: def.length.map(to_dbu),
                cuts: def.cuts,
            });
        }

        // Via definitions
        let mut vias = Vec::new();
        let mut via_map: FxHashMap<String, ViaId> = FxHashMap::default();
        for def in &ast.via_defs {
            if via_map.contains_key(&def.name) {
                return Err(duplicate("via definition", &def.name, def.line));
            }
            via_map.insert(def.name.clone(), ViaId(vias.len()));
            vias.push(ViaDef {
                name: def.name.clone(),
                bottom: find_layer(&tech, &def.bottom, def.line)?,
                cut: find_layer(&tech, &def.cut, def.line)?,
                top: find_layer(&tech, &def.top, def.line)?,
                cuts: Vec::new(),
                enclosures: Vec::new(),
            });
        }
        let find_via = |name: &str, line: usize| {
            via_map.get(name).copied().ok_or_else(|| PdnError::UnknownVia {
                name: name.to_string(),
                line,
            })
        };
        for shape in &ast.via_shapes {
            let via = find_via(&shape.via, shape.line)?;
            let rect = to_rect(&shape.rect);
            match &shape.layer {
                Some(layer) => {
                    let layer = find_layer(&tech, layer, shape.line)?;
                    vias[via.0].enclosures.push((layer, rect));
                }
                None => vias[via.0].cuts.push(rect),
            }
        }

        // Nets
        let mut nets = Vec::new();
        let mut net_map: FxHashMap<String, NetId> = FxHashMap::default();
        for def in &ast.nets {
            if net_map.contains_key(&def.name) {
                return Err(duplicate("net", &def.name, def.line));
            }
            net_map.insert(def.name.clone(), NetId(nets.len()));
            nets.push(Net {
                name: def.name.clone(),
                sig_type: def.sig_type,
                wires: Vec::new(),
                iterms: Vec::new(),
                bpins: Vec::new(),
            });
        }
        let find_net = |name: &str, line: usize| {
            net_map.get(name).copied().ok_or_else(|| PdnError::UnknownNet {
                name: name.to_string(),
                line,
            })
        };

        // Corners
        let mut corners = Vec::new();
        let mut corner_map: FxHashMap<String, CornerId> = FxHashMap::default();
        for def in &ast.corners {
            if corner_map.contains_key(&def.name) {
                return Err(duplicate("corner", &def.name, def.line));
            }
            corner_map.insert(def.name.clone(), CornerId(corners.len()));
            corners.push(Corner {
                name: def.name.clone(),
                voltage: def.voltage,
            });
        }
        let find_corner = |name: &str, line: usize| {
            corner_map.get(name).copied().ok_or_else(|| PdnError::UnknownCorner {
                name: name.to_string(),
                line,
            })
        };

        // Wires and vias
        for def in &ast.wires {
            let net = find_net(&def.net, def.line)?;
            let layer = find_layer(&tech, &def.layer, def.line)?;
            nets[net.0].wires.push(Wire::Segment {
                layer,
                rect: to_rect(&def.rect),
            });
        }
        for def in &ast.vias {
            let net = find_net(&def.net, def.line)?;
            nets[net.0].wires.push(Wire::Via {
                via: find_via(&def.via, def.line)?,
                origin: to_point(&def.origin),
            });
        }

        // Instances and their pins
        let mut instances: Vec<Instance> = Vec::new();
        let mut inst_map: FxHashMap<String, InstId> = FxHashMap::default();
        for def in &ast.instances {
            if inst_map.contains_key(&def.name) {
                return Err(duplicate("instance", &def.name, def.line));
            }
            inst_map.insert(def.name.clone(), InstId(instances.len()));
            instances.push(Instance {
                name: def.name.clone(),
                bbox: to_rect(&def.rect),
                status: def.status,
                is_pad: def.is_pad,
                pins: Vec::new(),
            });
        }
        let find_inst = |name: &str, line: usize| {
            inst_map.get(name).copied().ok_or_else(|| PdnError::UnknownInstance {
                name: name.to_string(),
                line,
            })
        };

        for def in &ast.pins {
            let inst = find_inst(&def.inst, def.line)?;
            let net = find_net(&def.net, def.line)?;
            let geometry = match &def.shape {
                PinShapeDef::Box { layer, rect } => PinGeometry::Box {
                    layer: find_layer(&tech, layer, def.line)?,
                    rect: to_rect(rect),
                },
                PinShapeDef::Via { via, origin } => PinGeometry::Via {
                    via: find_via(via, def.line)?,
                    origin: to_point(origin),
                },
            };

            let pins = &mut instances[inst.0].pins;
            let index = match pins.iter().position(|p| p.name == def.pin) {
                Some(index) => {
                    if pins[index].net != net {
                        return Err(PdnError::parse(
                            def.line,
                            format!("pin {}/{} is already tied to another net", def.inst, def.pin),
                        ));
                    }
                    index
                }
                None => {
                    pins.push(InstPin {
                        name: def.pin.clone(),
                        net,
                        geometry: Vec::new(),
                    });
                    nets[net.0].iterms.push(ITermId::new(inst, pins.len() - 1));
                    pins.len() - 1
                }
            };
            pins[index].geometry.push(geometry);
        }

        // Block pins
        let mut bpins: Vec<BPin> = Vec::new();
        for def in &ast.bpins {
            let net = find_net(&def.net, def.line)?;
            let layer = find_layer(&tech, &def.layer, def.line)?;
            let rect = to_rect(&def.rect);
            match bpins.iter().position(|p| p.net == net && p.name == def.name) {
                Some(index) => bpins[index].boxes.push((layer, rect)),
                None => {
                    nets[net.0].bpins.push(BPinId(bpins.len()));
                    bpins.push(BPin {
                        name: def.name.clone(),
                        net,
                        placed: def.placed,
                        boxes: vec![(layer, rect)],
                    });
                }
            }
        }

        // Power and parasitics
        let mut power = PowerTable::new();
        for (index, corner) in corners.iter().enumerate() {
            if let Some(voltage) = corner.voltage {
                power.set_pvt_voltage(CornerId(index), voltage);
            }
        }
        for def in &ast.sdc_voltages {
            power.set_sdc_voltage(find_net(&def.net, def.line)?, def.voltage);
        }
        for def in &ast.powers {
            power.set_instance_power(
                find_inst(&def.inst, def.line)?,
                find_corner(&def.corner, def.line)?,
                def.watts,
            );
        }
        for def in &ast.rcs {
            power.set_layer_rc(
                find_layer(&tech, &def.layer, def.line)?,
                find_corner(&def.corner, def.line)?,
                def.resistance,
                def.capacitance,
            );
        }

        let mut design = Self {
            name: ast.name.unwrap_or_else(|| "design".to_string()),
            dbu_per_micron,
            die: Rect::default(),
            core: Rect::default(),
            tech,
            vias,
            nets,
            instances,
            bpins,
            corners,
            power,
        };

        design.die = match &ast.die {
            Some(r) => to_rect(r),
            None => design.extent(),
        };
        design.core = match &ast.core {
            Some(r) => to_rect(r),
            None => design.die,
        };

        Ok(design)
    }

    /// Bounding box of all wires, instances and block pins.
    fn extent(&self) -> Rect {
        let wires = self.nets.iter().flat_map(|n| n.wires.iter()).map(|w| match w {
            Wire::Segment { rect, .. } => *rect,
            Wire::Via { via, origin } => self.vias[via.0].bbox(*origin),
        });
        let insts = self.instances.iter().map(|i| i.bbox);
        let pins = self.bpins.iter().flat_map(|p| p.boxes.iter().map(|(_, r)| *r));

        wires
            .chain(insts)
            .chain(pins)
            .reduce(|a, b| a.merge(&b))
            .unwrap_or_default()
    }

    /// Convert microns to database units.
    pub fn to_dbu(&self, microns: f64) -> i64 {
        (microns * self.dbu_per_micron as f64).round() as i64
    }

    /// Convert database units to microns.
    pub fn to_microns(&self, dbu: i64) -> f64 {
        dbu as f64 / self.dbu_per_micron as f64
    }

    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.0]
    }

    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.nets.iter().position(|n| n.name == name).map(NetId)
    }

    /// The first power net, which defines the nominal supply voltage.
    pub fn power_net(&self) -> Option<NetId> {
        self.nets.iter().position(|n| n.sig_type == SigType::Power).map(NetId)
    }

    pub fn instance(&self, id: InstId) -> &Instance {
        &self.instances[id.0]
    }

    pub fn iterm_pin(&self, iterm: ITermId) -> &InstPin {
        &self.instances[iterm.inst.0].pins[iterm.pin]
    }

    /// Hierarchical `instance/pin` name of an instance terminal.
    pub fn iterm_name(&self, iterm: ITermId) -> String {
        format!("{}/{}", self.instance(iterm.inst).name, self.iterm_pin(iterm).name)
    }

    /// Routing-layer shapes of an instance terminal. Via pins contribute
    /// their enclosures; cut boxes are skipped.
    pub fn iterm_shapes(&self, iterm: ITermId) -> Vec<(LayerId, Rect)> {
        let mut shapes = Vec::new();
        for geometry in &self.iterm_pin(iterm).geometry {
            match geometry {
                PinGeometry::Box { layer, rect } => {
                    if self.tech.layer(*layer).is_routing() {
                        shapes.push((*layer, *rect));
                    }
                }
                PinGeometry::Via { via, origin } => {
                    shapes.extend(
                        self.via(*via)
                            .enclosure_shapes(*origin)
                            .filter(|(layer, _)| self.tech.layer(*layer).is_routing()),
                    );
                }
            }
        }
        shapes
    }

    pub fn via(&self, id: ViaId) -> &ViaDef {
        &self.vias[id.0]
    }

    pub fn bpin(&self, id: BPinId) -> &BPin {
        &self.bpins[id.0]
    }

    pub fn corner(&self, id: CornerId) -> &Corner {
        &self.corners[id.0]
    }

    pub fn find_corner(&self, name: &str) -> Option<CornerId> {
        self.corners.iter().position(|c| c.name == name).map(CornerId)
    }
}

fn duplicate(kind: &'static str, name: &str, line: usize) -> PdnError {
    PdnError::DuplicateDefinition {
        kind,
        name: name.to_string(),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    const DESIGN: &str = "
.units 1000
.die 0 0 100 100
.layer M1 routing horizontal pitch=0.4 width=0.2 res=0.1
.layer V1 cut res=2
.layer M2 routing vertical pitch=0.8 width=0.4 res=0.05
.cutclass V1 width=0.1 cuts=1
.viadef via12 M1 V1 M2
VIACUT via12 -0.05 -0.05 0.05 0.05
VIAENC via12 M1 -0.1 -0.1 0.1 0.1
VIAENC via12 M2 -0.2 -0.2 0.2 0.2
.net VDD power
.net VSS ground
.corner tt voltage=1.1
.power u1 tt 2m
.rc M1 tt res=5e5
WIRE VDD M1 0 -0.1 100 0.1
VIA VDD via12 50 0
INST u1 10 10 20 20 fixed
PIN u1 VDD VDD M1 10 19.9 20 20.1
PIN u1 VDD VDD M1 10 9.9 20 10.1
PIN u1 VSS VSS M1 10 14.9 20 15.1
BPIN VDD vdd M2 40 90 60 100
";

    #[test]
    fn test_from_ast_resolves_names() {
        let design = Design::from_ast(parse(DESIGN).unwrap()).unwrap();
        let vdd = design.find_net("VDD").unwrap();
        let net = design.net(vdd);

        assert_eq!(design.dbu_per_micron, 1000);
        assert_eq!(design.die, Rect::new(0, 0, 100_000, 100_000));
        assert_eq!(design.core, design.die);
        assert_eq!(net.wires.len(), 2);
        assert_eq!(net.iterms.len(), 1);
        assert_eq!(net.bpins.len(), 1);

        let iterm = net.iterms[0];
        assert_eq!(design.iterm_name(iterm), "u1/VDD");
        assert_eq!(design.iterm_shapes(iterm).len(), 2);
        assert_eq!(design.power_net(), Some(vdd));
    }

    #[test]
    fn test_via_bbox() {
        let design = Design::from_ast(parse(DESIGN).unwrap()).unwrap();
        let via = &design.vias[0];
        assert_eq!(via.bbox(Point::new(50_000, 0)), Rect::new(49_800, -200, 50_200, 200));
        assert_eq!(via.cuts.len(), 1);
        assert_eq!(via.enclosures.len(), 2);
    }

    #[test]
    fn test_power_table_filled() {
        use crate::design::PowerProvider;

        let design = Design::from_ast(parse(DESIGN).unwrap()).unwrap();
        let tt = design.find_corner("tt").unwrap();
        assert_eq!(design.power.pvt_voltage(tt), Some(1.1));
        assert!((design.power.instance_power(InstId(0), tt) - 2e-3).abs() < 1e-15);
        let m1 = design.tech.find_layer("M1").unwrap();
        assert_eq!(design.power.layer_rc(m1, tt).0, 5e5);
    }

    #[test]
    fn test_unknown_layer_reports_line() {
        let result = Design::from_ast(parse(".net VDD power\nWIRE VDD M9 0 0 1 1").unwrap());
        assert!(matches!(result, Err(PdnError::UnknownLayer { line: 2, .. })));
    }

    #[test]
    fn test_duplicate_net() {
        let result = Design::from_ast(parse(".net VDD power\n.net VDD ground").unwrap());
        assert!(matches!(result, Err(PdnError::DuplicateDefinition { kind: "net", .. })));
    }
}
