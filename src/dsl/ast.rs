//! Abstract Syntax Tree types for the design description language.
//!
//! All geometry in the AST is still in microns; conversion to database
//! units happens when the [`Design`](crate::design::Design) is built.

use crate::design::{PlacementStatus, SigType};
use crate::geom::Direction;

/// A rectangle in microns: `[x0, y0, x1, y1]`.
pub type RectDef = [f64; 4];

/// Complete AST representation of a parsed design file.
#[derive(Debug, Clone, Default)]
pub struct DesignAst {
    /// Design name from `.design`
    pub name: Option<String>,
    /// Database units per micron from `.units`
    pub units: Option<f64>,
    pub die: Option<RectDef>,
    pub core: Option<RectDef>,
    /// Layers in stack order, bottom first
    pub layers: Vec<LayerDef>,
    pub cut_classes: Vec<CutClassDef>,
    pub via_defs: Vec<ViaDefDecl>,
    /// Cut and enclosure boxes of via definitions
    pub via_shapes: Vec<ViaShapeDef>,
    pub nets: Vec<NetDef>,
    pub corners: Vec<CornerDef>,
    pub sdc_voltages: Vec<SdcVoltageDef>,
    pub powers: Vec<PowerDef>,
    pub rcs: Vec<RcDef>,
    pub wires: Vec<WireDef>,
    pub vias: Vec<ViaPlacementDef>,
    pub instances: Vec<InstDef>,
    pub pins: Vec<PinDef>,
    pub bpins: Vec<BPinDef>,
}

impl DesignAst {
    /// Create a new empty design AST.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Layer types supported by `.layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    Routing,
    Cut,
}

impl LayerType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "routing" | "metal" => Some(Self::Routing),
            "cut" | "via" => Some(Self::Cut),
            _ => None,
        }
    }
}

/// `.layer <name> routing <dir> pitch= width= res=` or `.layer <name> cut res=`
#[derive(Debug, Clone)]
pub struct LayerDef {
    pub name: String,
    pub layer_type: LayerType,
    pub direction: Direction,
    /// Routing pitch in microns
    pub pitch: f64,
    /// Default width in microns
    pub width: f64,
    /// Ohm per square (routing) or ohm per cut (cut)
    pub resistance: f64,
    pub line: usize,
}

/// `.cutclass <layer> width= [length=] cuts=`
#[derive(Debug, Clone)]
pub struct CutClassDef {
    pub layer: String,
    pub width: f64,
    pub length: Option<f64>,
    pub cuts: u32,
    pub line: usize,
}

/// `.viadef <name> <bottom> <cut> <top>`
#[derive(Debug, Clone)]
pub struct ViaDefDecl {
    pub name: String,
    pub bottom: String,
    pub cut: String,
    pub top: String,
    pub line: usize,
}

/// `VIACUT` / `VIAENC` box, relative to the via origin.
#[derive(Debug, Clone)]
pub struct ViaShapeDef {
    pub via: String,
    /// Enclosure layer; `None` for a cut box
    pub layer: Option<String>,
    pub rect: RectDef,
    pub line: usize,
}

/// `.net <name> <power|ground|signal>`
#[derive(Debug, Clone)]
pub struct NetDef {
    pub name: String,
    pub sig_type: SigType,
    pub line: usize,
}

/// `.corner <name> [voltage=]`
#[derive(Debug, Clone)]
pub struct CornerDef {
    pub name: String,
    pub voltage: Option<f64>,
    pub line: usize,
}

/// `.sdcvoltage <net> <volts>`
#[derive(Debug, Clone)]
pub struct SdcVoltageDef {
    pub net: String,
    pub voltage: f64,
    pub line: usize,
}

/// `.power <inst> <corner> <watts>`
#[derive(Debug, Clone)]
pub struct PowerDef {
    pub inst: String,
    pub corner: String,
    pub watts: f64,
    pub line: usize,
}

/// `.rc <layer> <corner> res= [cap=]`
#[derive(Debug, Clone)]
pub struct RcDef {
    pub layer: String,
    pub corner: String,
    pub resistance: f64,
    pub capacitance: f64,
    pub line: usize,
}

/// `WIRE <net> <layer> x0 y0 x1 y1`
#[derive(Debug, Clone)]
pub struct WireDef {
    pub net: String,
    pub layer: String,
    pub rect: RectDef,
    pub line: usize,
}

/// `VIA <net> <viadef> x y`
#[derive(Debug, Clone)]
pub struct ViaPlacementDef {
    pub net: String,
    pub via: String,
    pub origin: [f64; 2],
    pub line: usize,
}

/// `INST <name> x0 y0 x1 y1 [placed|fixed|unplaced] [pad]`
#[derive(Debug, Clone)]
pub struct InstDef {
    pub name: String,
    pub rect: RectDef,
    pub status: PlacementStatus,
    pub is_pad: bool,
    pub line: usize,
}

/// Geometry of one instance pin statement.
#[derive(Debug, Clone)]
pub enum PinShapeDef {
    /// `PIN <inst> <pin> <net> <layer> x0 y0 x1 y1`
    Box { layer: String, rect: RectDef },
    /// `PINVIA <inst> <pin> <net> <viadef> x y`
    Via { via: String, origin: [f64; 2] },
}

/// An instance pin shape. Statements sharing `inst` and `pin` accumulate.
#[derive(Debug, Clone)]
pub struct PinDef {
    pub inst: String,
    pub pin: String,
    pub net: String,
    pub shape: PinShapeDef,
    pub line: usize,
}

/// `BPIN <net> <name> <layer> x0 y0 x1 y1 [unplaced]`
#[derive(Debug, Clone)]
pub struct BPinDef {
    pub net: String,
    pub name: String,
    pub layer: String,
    pub rect: RectDef,
    pub placed: bool,
    pub line: usize,
}
