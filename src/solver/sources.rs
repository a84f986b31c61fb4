//! Voltage source placement.
//!
//! Sources come from the first of these that yields any: a voltage source
//! file, block pin boxes, pad instance pins, or a synthesized pattern on the
//! top layer.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::design::LayerId;
use crate::error::{PdnError, Result};
use crate::geom::{Direction, Point, Rect};
use crate::network::{IrNetwork, Node, NodeId, NodeTree};

/// Default bump pitch, in microns.
pub const DEFAULT_BUMP_PITCH_UM: f64 = 140.0;

/// Default bump size, in microns.
pub const DEFAULT_BUMP_SIZE_UM: f64 = 10.0;

/// Keep one bump in every `interval` along each row.
pub const DEFAULT_BUMP_INTERVAL: usize = 3;

/// Strap spacing in tracks of the layer above the top grid layer.
pub const DEFAULT_STRAP_TRACK_PITCH: i64 = 10;

/// Pattern used to synthesize sources when none are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    /// Every top-layer node
    #[default]
    Full,
    /// Straps running across the top layer
    Straps,
    /// A staggered bump array over the core
    Bumps,
}

impl SourceType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "straps" | "strap" => Some(Self::Straps),
            "bumps" | "bump" => Some(Self::Bumps),
            _ => None,
        }
    }
}

impl FromStr for SourceType {
    type Err = PdnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_keyword(s).ok_or_else(|| PdnError::UnknownSourceType { name: s.to_string() })
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Straps => write!(f, "straps"),
            Self::Bumps => write!(f, "bumps"),
        }
    }
}

/// Parameters of the synthesized patterns.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub bump_pitch_um: f64,
    pub bump_size_um: f64,
    pub bump_interval: usize,
    pub strap_track_pitch: i64,
    /// Overrides `bump_pitch_um` along x.
    pub bump_pitch_x_um: Option<f64>,
    /// Overrides `bump_pitch_um` along y.
    pub bump_pitch_y_um: Option<f64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            bump_pitch_um: DEFAULT_BUMP_PITCH_UM,
            bump_size_um: DEFAULT_BUMP_SIZE_UM,
            bump_interval: DEFAULT_BUMP_INTERVAL,
            strap_track_pitch: DEFAULT_STRAP_TRACK_PITCH,
            bump_pitch_x_um: None,
            bump_pitch_y_um: None,
        }
    }
}

impl SourceSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bump_pitch_um(mut self, pitch: f64) -> Self {
        self.bump_pitch_um = pitch;
        self
    }

    /// Set separate bump pitches along x and y.
    pub fn with_bump_pitch_xy_um(mut self, x: f64, y: f64) -> Self {
        self.bump_pitch_x_um = Some(x);
        self.bump_pitch_y_um = Some(y);
        self
    }

    pub fn with_bump_size_um(mut self, size: f64) -> Self {
        self.bump_size_um = size;
        self
    }

    pub fn with_bump_interval(mut self, interval: usize) -> Self {
        self.bump_interval = interval;
        self
    }

    pub fn with_strap_track_pitch(mut self, tracks: i64) -> Self {
        self.strap_track_pitch = tracks;
        self
    }
}

/// Source locations read from a voltage source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Source boxes in DBU
    pub sites: Vec<Rect>,
    /// The one voltage shared by every record
    pub voltage: f64,
}

/// Read a voltage source file.
///
/// One record per line, `x_um,y_um,size_um,voltage`. Blank lines and lines
/// starting with `#` are skipped. Every record must carry the same voltage.
pub fn read_source_file(path: &Path, dbu_per_micron: i64) -> Result<SourceFile> {
    let text = fs::read_to_string(path).map_err(|e| PdnError::file_read(path, e))?;
    parse_source_records(&text, &path.display().to_string(), dbu_per_micron)
}

/// Parse voltage source records; `origin` names the input in errors.
pub fn parse_source_records(text: &str, origin: &str, dbu_per_micron: i64) -> Result<SourceFile> {
    let to_dbu = |um: f64| (um * dbu_per_micron as f64).round() as i64;
    let mut sites = Vec::new();
    let mut voltage: Option<f64> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let record = raw.trim();
        if record.is_empty() || record.starts_with('#') {
            continue;
        }

        let malformed = || PdnError::MalformedSourceRecord {
            path: origin.to_string(),
            line,
            record: record.to_string(),
        };
        let fields: Vec<f64> = record
            .split(',')
            .map(|f| f.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| malformed())?;
        let &[x, y, size, v] = fields.as_slice() else {
            return Err(malformed());
        };

        match voltage {
            None => voltage = Some(v),
            Some(first) if (first - v).abs() > 1e-9 => {
                return Err(PdnError::MixedSourceVoltages {
                    path: origin.to_string(),
                    first,
                    other: v,
                    line,
                });
            }
            Some(_) => {}
        }

        sites.push(Rect::centered(Point::new(to_dbu(x), to_dbu(y)), to_dbu(size)));
    }

    match voltage {
        Some(voltage) => Ok(SourceFile { sites, voltage }),
        None => Err(PdnError::EmptySourceFile {
            path: origin.to_string(),
        }),
    }
}

/// Create source nodes for the network.
///
/// Each returned node is a [`Node::source`] wrapping the real node it feeds.
pub fn generate_source_nodes(
    network: &IrNetwork<'_>,
    source_type: SourceType,
    file: Option<&SourceFile>,
    settings: &SourceSettings,
) -> Result<Vec<Node>> {
    let no_sources = || PdnError::NoSources {
        net: network.net_name().to_string(),
    };
    let top = network.top_layer().ok_or_else(no_sources)?;

    let sources = if let Some(file) = file {
        debug!("Placing {} sources from file", file.sites.len());
        match_sites(network, top, &file.sites)
    } else {
        let pins = bpin_sources(network);
        if !pins.is_empty() {
            debug!("Using {} block pin nodes as sources", pins.len());
            pins
        } else {
            let pads = pad_sources(network);
            if !pads.is_empty() {
                debug!("Using {} pad pin nodes as sources", pads.len());
                pads
            } else {
                match source_type {
                    SourceType::Full => full_sources(network, top),
                    SourceType::Straps => strap_sources(network, top, settings),
                    SourceType::Bumps => bump_sources(network, top, settings),
                }
            }
        }
    };

    if sources.is_empty() {
        return Err(no_sources());
    }
    info!("Number of voltage sources = {}", sources.len());
    Ok(sources)
}

/// Distance squared, wide enough for any pair of DBU coordinates.
fn distance2(a: Point, b: Point) -> i128 {
    let dx = (a.x - b.x) as i128;
    let dy = (a.y - b.y) as i128;
    dx * dx + dy * dy
}

/// The node inside `site` closest to its center, else the node nearest to
/// it. Ties go to the smaller node key.
fn match_site(network: &IrNetwork<'_>, index: &NodeTree, site: &Rect) -> Option<NodeId> {
    let center = site.center();
    let inside = index.in_rect(site);
    if !inside.is_empty() {
        return inside
            .into_iter()
            .min_by_key(|id| (distance2(network.node(*id).point(), center), *network.node(*id)));
    }
    let nearest = index.nearest(center).into_iter().min_by_key(|id| *network.node(*id))?;
    let design = network.design();
    let snapped = network.node(nearest).point();
    warn!(
        "Source at ({}, {}) is not located on an existing power stripe node, using ({}, {})",
        design.to_microns(center.x),
        design.to_microns(center.y),
        design.to_microns(snapped.x),
        design.to_microns(snapped.y)
    );
    Some(nearest)
}

fn match_sites(network: &IrNetwork<'_>, layer: LayerId, sites: &[Rect]) -> Vec<Node> {
    let index = network.node_index(layer);
    sites
        .iter()
        .filter_map(|site| {
            let id = match_site(network, &index, site)?;
            Some(Node::source(id, network.node(id), *site))
        })
        .collect()
}

fn bpin_sources(network: &IrNetwork<'_>) -> Vec<Node> {
    network
        .bpin_shape_nodes()
        .into_iter()
        .map(|(id, shape)| Node::source(id, network.node(id), shape))
        .collect()
}

fn pad_sources(network: &IrNetwork<'_>) -> Vec<Node> {
    let design = network.design();
    let mut sources = Vec::new();
    for &iterm in &design.net(network.net()).iterms {
        let inst = design.instance(iterm.inst);
        if !inst.is_pad || !inst.status.is_placed() {
            continue;
        }
        for (layer, rect) in design.iterm_shapes(iterm) {
            let index = network.node_index(layer);
            if let Some(id) = match_site(network, &index, &rect) {
                sources.push(Node::source(id, network.node(id), rect));
            }
        }
    }
    sources
}

fn full_sources(network: &IrNetwork<'_>, top: LayerId) -> Vec<Node> {
    network
        .layer_nodes(top)
        .iter()
        .map(|&id| {
            let node = network.node(id);
            Node::source(id, node, Rect::centered(node.point(), 0))
        })
        .collect()
}

fn strap_sources(network: &IrNetwork<'_>, top: LayerId, settings: &SourceSettings) -> Vec<Node> {
    let design = network.design();
    let tech = &design.tech;
    let top_layer = tech.layer(top);

    // straps sit on the layer above the grid, or on the top layer itself
    let strap_layer = tech
        .routing_layer(top_layer.routing_level + 1)
        .map(|id| tech.layer(id))
        .unwrap_or(top_layer);
    let pitch = if strap_layer.pitch > 0 {
        strap_layer.pitch
    } else {
        top_layer.pitch
    };
    let width = strap_layer.width.max(1);
    let spacing = settings.strap_track_pitch * pitch;
    let core = design.core;

    let vertical = top_layer.direction != Direction::Vertical;
    let (lo, hi) = if vertical {
        (core.xlo, core.xhi)
    } else {
        (core.ylo, core.yhi)
    };

    let mut positions = Vec::new();
    if spacing > 0 {
        let mut pos = lo + spacing / 2;
        while pos <= hi {
            positions.push(pos);
            pos += spacing;
        }
    }
    if positions.is_empty() {
        warn!("Strap spacing does not fit the core; using one strap at the center");
        positions.push((lo + hi) / 2);
    }

    let straps = positions.into_iter().map(|pos| {
        if vertical {
            Rect::new(pos - width / 2, core.ylo, pos + width / 2, core.yhi)
        } else {
            Rect::new(core.xlo, pos - width / 2, core.xhi, pos + width / 2)
        }
    });

    let shapes = network.shapes(top);
    let sites: Vec<Rect> = straps
        .flat_map(|strap| shapes.iter().filter_map(move |shape| shape.rect().intersection(&strap)))
        .collect();
    debug!("{} strap crossings on {}", sites.len(), top_layer.name);
    match_sites(network, top, &sites)
}

fn bump_sources(network: &IrNetwork<'_>, top: LayerId, settings: &SourceSettings) -> Vec<Node> {
    let design = network.design();
    let core = design.core;

    if settings.bump_pitch_x_um.is_none() || settings.bump_pitch_y_um.is_none() {
        info!("Using bump pitch of {} um", settings.bump_pitch_um);
    }
    let pitch_x = design.to_dbu(settings.bump_pitch_x_um.unwrap_or(settings.bump_pitch_um));
    let pitch_y = design.to_dbu(settings.bump_pitch_y_um.unwrap_or(settings.bump_pitch_um));
    let size = design.to_dbu(settings.bump_size_um);
    let interval = settings.bump_interval.max(1);

    let mut sites = Vec::new();
    if pitch_x <= 0 || pitch_y <= 0 || core.dx() < pitch_x || core.dy() < pitch_y {
        warn!("Core area is smaller than the bump pitch; placing one bump at the core center");
        sites.push(Rect::centered(core.center(), size));
    } else {
        let columns = core.dx() / pitch_x;
        let rows = core.dy() / pitch_y;
        let offset_x = (core.dx() - (columns - 1) * pitch_x) / 2;
        let offset_y = (core.dy() - (rows - 1) * pitch_y) / 2;
        for i in 0..rows {
            for j in 0..columns {
                if (j as usize) % interval != (i as usize) % interval {
                    continue;
                }
                let center = Point::new(core.xlo + offset_x + j * pitch_x, core.ylo + offset_y + i * pitch_y);
                sites.push(Rect::centered(center, size));
            }
        }
    }

    debug!("{} bumps over the core", sites.len());
    match_sites(network, top, &sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Design;
    use crate::network::{test_design, NetworkConfig, NodeKind, TEST_GRID};

    fn network(design: &Design) -> IrNetwork<'_> {
        let net = design.find_net("VDD").unwrap();
        let mut network = IrNetwork::new(design, net, NetworkConfig::default()).unwrap();
        network.construct();
        network
    }

    #[test]
    fn test_source_type_keywords() {
        assert_eq!("BUMPS".parse::<SourceType>().unwrap(), SourceType::Bumps);
        assert_eq!(SourceType::from_keyword("straps"), Some(SourceType::Straps));
        assert_eq!(SourceType::Full.to_string(), "full");
        assert!(matches!(
            "ring".parse::<SourceType>(),
            Err(PdnError::UnknownSourceType { .. })
        ));
    }

    #[test]
    fn test_parse_source_records() {
        let text = "# x,y,size,v\n10,20,1,1.1\n\n30.5, 40, 2, 1.1\n";
        let file = parse_source_records(text, "vsrc", 1000).unwrap();
        assert_eq!(file.voltage, 1.1);
        assert_eq!(
            file.sites,
            vec![
                Rect::new(9_500, 19_500, 10_500, 20_500),
                Rect::new(29_500, 39_000, 31_500, 41_000)
            ]
        );
    }

    #[test]
    fn test_mixed_voltages_rejected() {
        let result = parse_source_records("0,0,1,1.0\n5,5,1,0.9\n", "vsrc", 1000);
        match result {
            Err(PdnError::MixedSourceVoltages { line, other, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(other, 0.9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_and_empty_records() {
        assert!(matches!(
            parse_source_records("1,2,3\n", "vsrc", 1000),
            Err(PdnError::MalformedSourceRecord { line: 1, .. })
        ));
        assert!(matches!(
            parse_source_records("1,2,x,1\n", "vsrc", 1000),
            Err(PdnError::MalformedSourceRecord { .. })
        ));
        assert!(matches!(
            parse_source_records("# nothing\n", "vsrc", 1000),
            Err(PdnError::EmptySourceFile { .. })
        ));
    }

    #[test]
    fn test_missing_source_file() {
        let path = std::env::temp_dir().join("pdnsim_no_such_source_file.csv");
        assert!(matches!(
            read_source_file(&path, 1000),
            Err(PdnError::FileReadError { .. })
        ));
    }

    #[test]
    fn test_full_sources_cover_top_layer() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let sources = generate_source_nodes(&network, SourceType::Full, None, &SourceSettings::default()).unwrap();

        assert_eq!(sources.len(), network.top_layer_nodes().len());
        for (source, id) in sources.iter().zip(network.top_layer_nodes()) {
            assert_eq!(source.source_target(), Some(*id));
            assert_eq!(source.point(), network.node(*id).point());
        }
    }

    #[test]
    fn test_file_sources_match_nearest_node() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let file = parse_source_records("20,59,0.1,1.0\n", "vsrc", 1000).unwrap();

        let sources = generate_source_nodes(&network, SourceType::Bumps, Some(&file), &SourceSettings::default())
            .unwrap();
        assert_eq!(sources.len(), 1);
        let target = network.node(sources[0].source_target().unwrap());
        assert_eq!(target.point().x, 20_000);
        assert_eq!(Some(target.layer()), network.top_layer());
    }

    #[test]
    fn test_file_source_off_stripe_snaps() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let file = parse_source_records("45,30,0.1,1.0\n", "vsrc", 1000).unwrap();
        let top = network.top_layer().unwrap();
        let site = Rect::centered(Point::new(45_000, 30_000), 100);
        assert!(network.node_index(top).in_rect(&site).is_empty());

        let sources = generate_source_nodes(&network, SourceType::Full, Some(&file), &SourceSettings::default())
            .unwrap();
        assert_eq!(sources.len(), 1);
        let target = network.node(sources[0].source_target().unwrap());
        assert_eq!(target.point().x, 20_000);
        assert_eq!(target.layer(), top);
    }

    #[test]
    fn test_bump_on_small_core() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let sources = generate_source_nodes(&network, SourceType::Bumps, None, &SourceSettings::default()).unwrap();
        // the 100x60 core is smaller than the bump pitch
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_staggered_bumps() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let settings = SourceSettings::new().with_bump_pitch_um(10.0).with_bump_interval(3);
        let sources = generate_source_nodes(&network, SourceType::Bumps, None, &settings).unwrap();
        // 10 x 6 array keeps columns j with j % 3 == i % 3
        assert!(!sources.is_empty());
        assert!(sources
            .iter()
            .all(|s| matches!(s.kind(), NodeKind::Source { shape, .. } if shape.dx() == 10_000)));
    }

    #[test]
    fn test_strap_sources_cross_top_shapes() {
        let design = test_design(TEST_GRID);
        let network = network(&design);
        let sources = generate_source_nodes(&network, SourceType::Straps, None, &SourceSettings::default()).unwrap();
        assert!(!sources.is_empty());
        let top = network.top_layer().unwrap();
        assert!(sources
            .iter()
            .all(|s| network.node(s.source_target().unwrap()).layer() == top));
    }

    #[test]
    fn test_bpin_sources_take_priority() {
        let text = format!("{}BPIN VDD vdd M2 19.8 58 20.2 60\n", TEST_GRID);
        let design = test_design(&text);
        let network = network(&design);
        let sources = generate_source_nodes(&network, SourceType::Full, None, &SourceSettings::default()).unwrap();
        assert!(!sources.is_empty());
        assert!(sources.len() < network.top_layer_nodes().len());
        assert!(sources.iter().all(|s| s.point().y >= 58_000));
    }
}
