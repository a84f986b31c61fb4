//! Static IR-drop solve of one supply net.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info, trace, warn};
use rustc_hash::FxHashSet;

use super::check::{check_open, check_short, ConnectivityReport};
use super::matrix::SparseSystem;
use super::sources::{generate_source_nodes, SourceFile, SourceSettings, SourceType};
use crate::design::{CornerId, Design, LayerId, NetId, PowerProvider, SigType};
use crate::error::{PdnError, Result};
use crate::geom::Point;
use crate::network::{ConnectionKind, IrNetwork, Node, NodeId, ResistanceMap};

/// User supply voltages keyed by net and corner.
pub type VoltageOverrides = BTreeMap<(NetId, CornerId), f64>;

/// Configuration for the solver.
#[derive(Debug, Clone, Default)]
pub struct SolverConfig {
    /// Parameters of synthesized source patterns.
    pub source_settings: SourceSettings,
    /// Where to dump G, J and the node table before factorizing.
    pub debug_dump_dir: Option<PathBuf>,
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_settings(mut self, settings: SourceSettings) -> Self {
        self.source_settings = settings;
        self
    }

    /// Dump the assembled system into `dir` before every solve.
    pub fn with_debug_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dump_dir = Some(dir.into());
        self
    }
}

/// A voltage source after the solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResult {
    /// The source node; its target is the grid node it feeds
    pub node: Node,
    /// Current delivered into the grid, in amperes
    pub current: f64,
}

/// Results of one solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Voltage driven by every source
    pub supply_voltage: f64,
    /// Power-net voltage used for load currents and percent drop
    pub nominal_voltage: f64,
    /// Voltage per node, indexed by [`NodeId`]
    pub voltages: Vec<f64>,
    /// Injected current per node, indexed by [`NodeId`]
    pub currents: Vec<f64>,
    pub sources: Vec<SourceResult>,
    pub resistance: ResistanceMap,
}

impl Solution {
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.voltages[node.0]
    }
}

/// Solves the IR drop of one supply net, corner by corner.
pub struct IrSolver<'d> {
    network: IrNetwork<'d>,
    power: &'d dyn PowerProvider,
    config: SolverConfig,
    connectivity: Option<ConnectivityReport>,
    solutions: BTreeMap<CornerId, Solution>,
}

impl<'d> IrSolver<'d> {
    /// Create a solver over a network, constructing it first if needed.
    /// Power data comes from the design's own table.
    pub fn new(mut network: IrNetwork<'d>, config: SolverConfig) -> Self {
        if network.is_empty() {
            network.construct();
        }
        let power: &'d dyn PowerProvider = &network.design().power;
        Self {
            network,
            power,
            config,
            connectivity: None,
            solutions: BTreeMap::new(),
        }
    }

    /// Take power and parasitics from another provider.
    pub fn with_provider(mut self, power: &'d dyn PowerProvider) -> Self {
        self.power = power;
        self.solutions.clear();
        self
    }

    pub fn network(&self) -> &IrNetwork<'d> {
        &self.network
    }

    pub fn design(&self) -> &'d Design {
        self.network.design()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_source_settings(&mut self, settings: SourceSettings) {
        self.config.source_settings = settings;
    }

    /// Rebuild the network, dropping every cached result.
    pub fn rebuild(&mut self, floorplanning: bool) {
        self.network.set_floorplanning(floorplanning);
        self.network.construct();
        self.connectivity = None;
        self.solutions.clear();
    }

    /// Rebuild with new node density settings.
    pub fn set_node_density(&mut self, min_node_pitch_um: f64, multiplier: i64) {
        self.network.set_min_node_pitch_um(min_node_pitch_um);
        self.network.set_node_pitch_multiplier(multiplier);
        let floorplanning = self.network.is_floorplanning();
        self.rebuild(floorplanning);
    }

    /// Forget the solution for one corner.
    pub fn clear_solution(&mut self, corner: CornerId) {
        self.solutions.remove(&corner);
    }

    /// Whether the grid is connected and free of shorts. Memoized until the
    /// network is rebuilt.
    pub fn check(&mut self) -> bool {
        if self.connectivity.is_none() {
            let start = Instant::now();
            self.connectivity = Some(check_open(&self.network));
            trace!("Connectivity check took {:?}", start.elapsed());
        }
        let open_ok = self.connectivity.as_ref().is_some_and(ConnectivityReport::is_connected);
        open_ok && check_short(&self.network)
    }

    /// Result of the last connectivity check, if one ran.
    pub fn connectivity(&self) -> Option<&ConnectivityReport> {
        self.connectivity.as_ref()
    }

    pub fn solution(&self, corner: CornerId) -> Option<&Solution> {
        self.solutions.get(&corner)
    }

    pub fn is_solved(&self, corner: CornerId) -> bool {
        self.solutions.contains_key(&corner)
    }

    /// Solved voltage of a node.
    pub fn voltage(&self, corner: CornerId, node: NodeId) -> Option<f64> {
        self.solutions.get(&corner).map(|s| s.voltage(node))
    }

    /// The solution for `corner`, or an error naming what was never solved.
    pub fn require_solution(&self, corner: CornerId) -> Result<&Solution> {
        self.solutions.get(&corner).ok_or_else(|| PdnError::NotSolved {
            net: self.network.net_name().to_string(),
            corner: self.design().corner(corner).name.clone(),
        })
    }

    fn missing_voltage(&self, net: NetId, corner: CornerId) -> PdnError {
        let design = self.design();
        PdnError::MissingVoltage {
            net: design.net(net).name.clone(),
            corner: design.corner(corner).name.clone(),
        }
    }

    /// Voltage driven by the sources.
    ///
    /// Ground nets are driven at 0 V. For power nets the first of these
    /// wins: the voltage of a previous solve, the user override, the
    /// source file, the SDC voltage, the corner's PVT default.
    pub fn supply_voltage(
        &self,
        corner: CornerId,
        overrides: &VoltageOverrides,
        file: Option<&SourceFile>,
    ) -> Result<f64> {
        let net = self.network.net();
        if self.network.sig_type() == SigType::Ground {
            return Ok(0.0);
        }

        self.solutions
            .get(&corner)
            .map(|s| s.supply_voltage)
            .or_else(|| overrides.get(&(net, corner)).copied())
            .or_else(|| file.map(|f| f.voltage))
            .or_else(|| self.power.sdc_voltage(net, corner))
            .or_else(|| self.power.pvt_voltage(corner))
            .ok_or_else(|| self.missing_voltage(net, corner))
    }

    /// Power-net voltage used to turn instance power into current.
    pub fn nominal_voltage(&self, corner: CornerId, overrides: &VoltageOverrides, supply: f64) -> Result<f64> {
        if self.network.sig_type() == SigType::Power {
            return Ok(supply);
        }

        let power_net = self.design().power_net();
        power_net
            .and_then(|net| {
                overrides
                    .get(&(net, corner))
                    .copied()
                    .or_else(|| self.power.sdc_voltage(net, corner))
            })
            .or_else(|| self.power.pvt_voltage(corner))
            .ok_or_else(|| self.missing_voltage(power_net.unwrap_or(self.network.net()), corner))
    }

    /// Resistance per layer for a corner: ohm per square on routing layers,
    /// ohm per cut on cut layers.
    ///
    /// Routing-layer parasitics are given per meter of a unit-width wire and
    /// scaled by the layer's default width. Layers without parasitics fall
    /// back to the technology resistance.
    pub fn generate_conductance_map(&self, corner: CornerId) -> ResistanceMap {
        let design = self.design();
        let used: FxHashSet<LayerId> = self
            .network
            .connections()
            .iter()
            .filter_map(|c| match *c.kind() {
                ConnectionKind::Layer { layer, .. } | ConnectionKind::Via { layer, .. } => Some(layer),
                ConnectionKind::Term => None,
            })
            .collect();

        let mut map = ResistanceMap::default();
        for (id, layer) in design.tech.layers() {
            let (per_meter, _) = self.power.layer_rc(id, corner);
            let mut resistance = if layer.is_routing() {
                per_meter * design.to_microns(layer.width) * 1e-6
            } else {
                per_meter
            };
            if resistance <= 0.0 {
                resistance = layer.resistance;
            }
            if resistance <= 0.0 && used.contains(&id) {
                warn!("Layer {} has no resistance; its connections cannot be solved", layer.name);
            }
            debug!("Resistance of {}: {:.6e}", layer.name, resistance);
            map.insert(id, resistance);
        }
        map
    }

    /// Current injected at every node, indexed by [`NodeId`].
    ///
    /// Each instance draws `power / nominal_voltage`, split evenly over its
    /// pin anchors. Loads on a power net pull current out of the grid;
    /// on a ground net they push it in.
    pub fn build_node_current_map(&self, corner: CornerId, nominal_voltage: f64) -> Vec<f64> {
        let mut currents = vec![0.0; self.network.nodes().len()];
        if nominal_voltage == 0.0 {
            warn!("Nominal voltage is zero; no load currents applied");
            return currents;
        }

        let sign = if self.network.sig_type() == SigType::Ground {
            1.0
        } else {
            -1.0
        };
        let mut total = 0.0;
        for (inst, anchors) in self.network.instance_node_mapping() {
            let power = self.power.instance_power(inst, corner);
            if power == 0.0 || anchors.is_empty() {
                continue;
            }
            let current = power / nominal_voltage;
            total += current;
            let share = current / anchors.len() as f64;
            for id in anchors {
                currents[id.0] += sign * share;
            }
        }
        debug!("Total load current {:.6e} A", total);
        currents
    }

    /// Solve the net at one corner.
    ///
    /// Refuses empty or unconnected networks. A `source_file` takes
    /// precedence over every other way of placing sources.
    pub fn solve(
        &mut self,
        corner: CornerId,
        source_type: SourceType,
        source_file: Option<&SourceFile>,
        overrides: &VoltageOverrides,
    ) -> Result<()> {
        let start = Instant::now();
        let design = self.design();
        let net_name = self.network.net_name();
        let corner_name = &design.corner(corner).name;

        if self.network.is_empty() {
            return Err(PdnError::EmptyNetwork {
                net: net_name.to_string(),
            });
        }
        if !self.check() {
            return Err(PdnError::Unconnected {
                net: net_name.to_string(),
            });
        }

        let supply = self.supply_voltage(corner, overrides, source_file)?;
        let nominal = self.nominal_voltage(corner, overrides, supply)?;
        info!(
            "Analyzing net {} at corner {} with supply voltage {:.4} V",
            net_name, corner_name, supply
        );

        let resistance = self.generate_conductance_map(corner);
        let currents = self.build_node_current_map(corner, nominal);
        let sources = generate_source_nodes(
            &self.network,
            source_type,
            source_file,
            &self.config.source_settings,
        )?;

        let node_count = self.network.nodes().len();
        let mut system = SparseSystem::new(node_count + sources.len());
        for connection in self.network.connections() {
            if let Some((a, b)) = connection.endpoints() {
                system.stamp_conductance(a.0, b.0, 1.0 / connection.resistance(&resistance));
            }
        }
        for (index, &current) in currents.iter().enumerate() {
            if current != 0.0 {
                system.add_rhs(index, current);
            }
        }
        for (offset, source) in sources.iter().enumerate() {
            if let Some(target) = source.source_target() {
                system.stamp_source(node_count + offset, target.0, supply);
            }
        }
        debug!(
            "Assembled {} x {} system with {} entries",
            system.size(),
            system.size(),
            system.nonzeros()
        );

        if let Some(dir) = &self.config.debug_dump_dir {
            let tech = &design.tech;
            let labels: Vec<String> = self
                .network
                .nodes()
                .iter()
                .map(|n| n.name(net_name, tech))
                .chain((0..sources.len()).map(|k| format!("{}_source{}", net_name, k)))
                .collect();
            system.write_dump(dir, &format!("{}_{}", net_name, corner_name), &labels)?;
        }

        let x = system.solve().map_err(|e| {
            warn!("Solve of net {} failed: {}", net_name, e);
            e
        })?;

        let sources = sources
            .into_iter()
            .enumerate()
            .map(|(offset, node)| SourceResult {
                node,
                current: -x[node_count + offset],
            })
            .collect();

        self.solutions.insert(
            corner,
            Solution {
                supply_voltage: supply,
                nominal_voltage: nominal,
                voltages: x[..node_count].to_vec(),
                currents,
                sources,
                resistance,
            },
        );
        trace!("Solved net {} in {:?}", net_name, start.elapsed());
        Ok(())
    }

    /// IR drop at every node of one layer, as `(location, |supply - V|)`.
    pub fn ir_drop_map(&self, corner: CornerId, layer: LayerId) -> Result<Vec<(Point, f64)>> {
        let solution = self.require_solution(corner)?;
        Ok(self
            .network
            .layer_nodes(layer)
            .iter()
            .map(|&id| {
                let drop = (solution.supply_voltage - solution.voltage(id)).abs();
                (self.network.node(id).point(), drop)
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::network::{test_design, NetworkConfig, TEST_GRID};
    use crate::solver::sources::parse_source_records;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// 3x3 grid of 20um M1 rails and M2 straps on a 10um pitch with one
    /// instance drawing 1mA at the center.
    pub(crate) const MESH: &str = "
.units 1000
.die 0 0 20 20
.layer M1 routing horizontal pitch=0.4 width=0.2 res=0.1
.layer V1 cut res=2
.layer M2 routing vertical pitch=0.8 width=0.4 res=0.05
.viadef via12 M1 V1 M2
VIACUT via12 -0.05 -0.05 0.05 0.05
VIAENC via12 M1 -0.2 -0.2 0.2 0.2
VIAENC via12 M2 -0.2 -0.2 0.2 0.2
.net VDD power
.net VSS ground
.corner tt voltage=1.0
.power u1 tt 1m
WIRE VDD M1 0 -0.1 20 0.1
WIRE VDD M1 0 9.9 20 10.1
WIRE VDD M1 0 19.9 20 20.1
WIRE VDD M2 -0.2 0 0.2 20
WIRE VDD M2 9.8 0 10.2 20
WIRE VDD M2 19.8 0 20.2 20
VIA VDD via12 0 0
VIA VDD via12 0 10
VIA VDD via12 0 20
VIA VDD via12 10 0
VIA VDD via12 10 10
VIA VDD via12 10 20
VIA VDD via12 20 0
VIA VDD via12 20 10
VIA VDD via12 20 20
INST u1 9 9 11 11 fixed
PIN u1 VDD VDD M1 9.5 9.9 10.5 10.1
";

    fn solver<'d>(design: &'d Design, net: &str) -> IrSolver<'d> {
        let net = design.find_net(net).unwrap();
        let network = IrNetwork::new(design, net, NetworkConfig::default()).unwrap();
        IrSolver::new(network, SolverConfig::default())
    }

    fn node_at(solver: &IrSolver<'_>, layer: &str, x: i64, y: i64) -> NodeId {
        let layer = solver.design().tech.find_layer(layer).unwrap();
        *solver
            .network()
            .layer_nodes(layer)
            .iter()
            .find(|id| solver.network().node(**id).point() == Point::new(x, y))
            .unwrap()
    }

    #[test]
    fn test_corner_source_mesh() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VDD");
        let file = parse_source_records("0,0,0.1,1.0\n", "vsrc", 1000).unwrap();

        solver
            .solve(corner, SourceType::Full, Some(&file), &VoltageOverrides::new())
            .unwrap();
        let solution = solver.solution(corner).unwrap();
        assert_eq!(solution.sources.len(), 1);
        assert_relative_eq!(solution.supply_voltage, 1.0);

        // 1mA through the 1 ohm source resistance
        let source_node = solution.sources[0].node.source_target().unwrap();
        assert_abs_diff_eq!(solution.voltage(source_node), 0.999, epsilon = 1e-6);
        assert_relative_eq!(solution.sources[0].current, 1e-3, max_relative = 1e-9);

        let near = solution.voltage(node_at(&solver, "M2", 10_000, 0));
        let center = solution.voltage(node_at(&solver, "M2", 10_000, 10_000));
        assert!(solution.voltage(source_node) > near);
        assert!(near > center);

        let anchor = solver.network().iterm_nodes()[0];
        let lowest = solution.voltages.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_relative_eq!(solution.voltage(anchor), lowest);
        let highest = solution.voltages.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(solution.voltage(source_node), highest);

        for &v in &solution.voltages {
            assert!(
                v >= lowest && v <= solution.supply_voltage,
                "{} outside [{}, {}]",
                v,
                lowest,
                solution.supply_voltage
            );
        }
    }

    #[test]
    fn test_kirchhoff_current_law() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VDD");
        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();
        let solution = solver.solution(corner).unwrap();
        let fed: FxHashSet<NodeId> = solution
            .sources
            .iter()
            .filter_map(|s| s.node.source_target())
            .collect();

        let mut balance = vec![0.0; solution.voltages.len()];
        for c in solver.network().connections() {
            let (a, b) = c.endpoints().unwrap();
            let flow = (solution.voltage(a) - solution.voltage(b)) / c.resistance(&solution.resistance);
            balance[a.0] += flow;
            balance[b.0] -= flow;
        }
        for (index, &injected) in solution.currents.iter().enumerate() {
            if fed.contains(&NodeId(index)) {
                continue;
            }
            assert_abs_diff_eq!(balance[index], injected, epsilon = 1e-9);
        }

        let delivered: f64 = solution.sources.iter().map(|s| s.current).sum();
        assert_relative_eq!(delivered, 1e-3, max_relative = 1e-6);
    }

    #[test]
    fn test_single_top_node_full_sources() {
        let text = "
.units 1000
.layer M1 routing horizontal pitch=0.4 width=0.2 res=0.1
.layer V1 cut res=2
.layer M2 routing vertical pitch=0.8 width=0.4 res=0.05
.viadef via12 M1 V1 M2
VIACUT via12 -0.05 -0.05 0.05 0.05
VIAENC via12 M1 -0.2 -0.1 0.2 0.1
VIAENC via12 M2 -0.2 -0.2 0.2 0.2
.net VDD power
.corner tt voltage=1.2
.power u1 tt 2m
WIRE VDD M1 0 -0.1 10 0.1
WIRE VDD M2 4.8 -0.2 5.2 0.2
VIA VDD via12 5 0
INST u1 0 -1 2 1 fixed
PIN u1 VDD VDD M1 0 -0.1 2 0.1
";
        let design = test_design(text);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VDD");
        assert_eq!(solver.network().top_layer_nodes().len(), 1);

        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();
        let solution = solver.solution(corner).unwrap();
        assert_eq!(solution.sources.len(), 1);
        assert_relative_eq!(solution.supply_voltage, 1.2);
        assert!(solution.voltages.iter().all(|v| *v < 1.2 && *v > 1.1));
    }

    #[test]
    fn test_unconnected_grid_refuses_to_solve() {
        let text = TEST_GRID
            .replace("VIA VDD via12 80 10\n", "")
            .replace("VIA VDD via12 80 50\n", "");
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VDD");

        assert!(!solver.check());
        assert!(!solver.connectivity().unwrap().is_connected());
        let result = solver.solve(corner, SourceType::Full, None, &VoltageOverrides::new());
        assert!(matches!(result, Err(PdnError::Unconnected { .. })));
    }

    #[test]
    fn test_voltage_resolution_order() {
        let design = test_design(TEST_GRID);
        let corner = design.find_corner("tt").unwrap();
        let vdd = design.find_net("VDD").unwrap();
        let mut solver = solver(&design, "VDD");
        let file = parse_source_records("20,59,1,0.95\n", "vsrc", 1000).unwrap();

        let none = VoltageOverrides::new();
        assert_relative_eq!(solver.supply_voltage(corner, &none, None).unwrap(), 1.0);
        assert_relative_eq!(solver.supply_voltage(corner, &none, Some(&file)).unwrap(), 0.95);

        let mut overrides = VoltageOverrides::new();
        overrides.insert((vdd, corner), 1.1);
        assert_relative_eq!(solver.supply_voltage(corner, &overrides, Some(&file)).unwrap(), 1.1);

        // a solved voltage sticks until the solution is cleared
        solver.solve(corner, SourceType::Full, None, &overrides).unwrap();
        assert_relative_eq!(solver.supply_voltage(corner, &none, None).unwrap(), 1.1);
        solver.clear_solution(corner);
        assert_relative_eq!(solver.supply_voltage(corner, &none, None).unwrap(), 1.0);
    }

    #[test]
    fn test_missing_voltage() {
        let text = TEST_GRID.replace(".corner tt voltage=1.0", ".corner tt");
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VDD");
        let result = solver.solve(corner, SourceType::Full, None, &VoltageOverrides::new());
        assert!(matches!(result, Err(PdnError::MissingVoltage { .. })));
    }

    #[test]
    fn test_ground_net_rises_above_zero() {
        let text = MESH
            .replace("WIRE VDD", "WIRE VSS")
            .replace("VIA VDD", "VIA VSS")
            .replace("PIN u1 VDD VDD", "PIN u1 VSS VSS");
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let mut solver = solver(&design, "VSS");
        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();

        let solution = solver.solution(corner).unwrap();
        assert_eq!(solution.supply_voltage, 0.0);
        assert_relative_eq!(solution.nominal_voltage, 1.0);
        assert!(solution.voltages.iter().all(|v| *v >= 0.0));
        let anchor = solver.network().iterm_nodes()[0];
        assert!(solution.voltage(anchor) > 0.0);
        assert!(solution.currents[anchor.0] > 0.0);
    }

    #[test]
    fn test_conductance_map_prefers_parasitics() {
        let text = format!("{}.rc M2 tt res=250000\n.rc V1 tt res=4\n", MESH);
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let solver = solver(&design, "VDD");
        let map = solver.generate_conductance_map(corner);

        let m1 = design.tech.find_layer("M1").unwrap();
        let v1 = design.tech.find_layer("V1").unwrap();
        let m2 = design.tech.find_layer("M2").unwrap();
        assert_relative_eq!(map[&m1], 0.1);
        assert_relative_eq!(map[&v1], 4.0);
        // 250 kohm/m times a 0.4um wide wire
        assert_relative_eq!(map[&m2], 0.1, max_relative = 1e-9);
    }

    /// Draws a fixed current per instance and reports no parasitics.
    struct FixedLoad {
        watts: f64,
    }

    impl PowerProvider for FixedLoad {
        fn instance_power(&self, _inst: crate::design::InstId, _corner: CornerId) -> f64 {
            self.watts
        }

        fn layer_rc(&self, _layer: LayerId, _corner: CornerId) -> (f64, f64) {
            (0.0, 0.0)
        }

        fn sdc_voltage(&self, _net: NetId, _corner: CornerId) -> Option<f64> {
            None
        }

        fn pvt_voltage(&self, _corner: CornerId) -> Option<f64> {
            Some(1.0)
        }
    }

    #[test]
    fn test_zero_parasitics_fall_back_to_tech() {
        let text = format!("{}.rc M2 tt res=250000\n.rc V1 tt res=4\n", MESH);
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let provider = FixedLoad { watts: 2e-3 };
        let solver = solver(&design, "VDD").with_provider(&provider);
        let map = solver.generate_conductance_map(corner);

        let m1 = design.tech.find_layer("M1").unwrap();
        let v1 = design.tech.find_layer("V1").unwrap();
        let m2 = design.tech.find_layer("M2").unwrap();
        assert_relative_eq!(map[&m1], 0.1);
        assert_relative_eq!(map[&v1], 2.0);
        assert_relative_eq!(map[&m2], 0.05);
    }

    #[test]
    fn test_custom_provider_drives_loads() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let provider = FixedLoad { watts: 2e-3 };
        let mut solver = solver(&design, "VDD").with_provider(&provider);
        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();

        let solution = solver.solution(corner).unwrap();
        let total: f64 = solution.sources.iter().map(|s| s.current).sum();
        assert_relative_eq!(total, 2e-3, max_relative = 1e-6);
        let currents = solver.build_node_current_map(corner, 1.0);
        assert_relative_eq!(currents.iter().sum::<f64>(), -2e-3, max_relative = 1e-9);
    }

    #[test]
    fn test_ir_drop_map_and_not_solved() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let m1 = design.tech.find_layer("M1").unwrap();
        let mut solver = solver(&design, "VDD");
        assert!(matches!(solver.ir_drop_map(corner, m1), Err(PdnError::NotSolved { .. })));

        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();
        let drops = solver.ir_drop_map(corner, m1).unwrap();
        assert_eq!(drops.len(), solver.network().layer_nodes(m1).len());
        assert!(drops.iter().all(|(_, d)| *d >= 0.0 && *d < 0.01));
    }

    #[test]
    fn test_debug_dump() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let dir = std::env::temp_dir().join(format!("pdnsim_dump_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let net = design.find_net("VDD").unwrap();
        let network = IrNetwork::new(&design, net, NetworkConfig::default()).unwrap();
        let mut solver = IrSolver::new(network, SolverConfig::new().with_debug_dump_dir(&dir));
        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();

        let g = std::fs::read_to_string(dir.join("VDD_tt_G.mtx")).unwrap();
        assert!(g.starts_with("%%MatrixMarket"));
        assert!(dir.join("VDD_tt_J.txt").exists());
        assert!(dir.join("VDD_tt_nodes.txt").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
