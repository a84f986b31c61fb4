//! Analysis driver.
//!
//! [`PdnSim`] owns one [`IrSolver`] per analyzed net and keeps them across
//! calls, so a connectivity check followed by an IR analysis extracts the
//! network once.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::design::{CornerId, Design, NetId};
use crate::error::{PdnError, Result};
use crate::geom::Point;
use crate::network::{IrNetwork, NetworkConfig};
use crate::solver::{read_source_file, IrReport, IrSolver, SolverConfig, SourceSettings, SourceType, VoltageOverrides};

/// Report files written by [`PdnSim::analyze_power_grid`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutputs {
    /// Per-instance voltages (CSV)
    pub voltage_file: Option<PathBuf>,
    /// Per-segment currents (CSV)
    pub em_file: Option<PathBuf>,
    /// Connectivity violations
    pub error_file: Option<PathBuf>,
    /// SPICE netlist of the solved grid
    pub spice_file: Option<PathBuf>,
    /// The sources used, in voltage source file format
    pub source_file: Option<PathBuf>,
}

impl AnalysisOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voltage_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.voltage_file = Some(path.into());
        self
    }

    pub fn with_em_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.em_file = Some(path.into());
        self
    }

    pub fn with_error_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_file = Some(path.into());
        self
    }

    pub fn with_spice_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.spice_file = Some(path.into());
        self
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }
}

/// Power-grid analysis of one design.
pub struct PdnSim<'d> {
    design: &'d Design,
    network_config: NetworkConfig,
    solver_config: SolverConfig,
    solvers: BTreeMap<NetId, IrSolver<'d>>,
    overrides: VoltageOverrides,
}

impl<'d> PdnSim<'d> {
    pub fn new(design: &'d Design) -> Self {
        Self {
            design,
            network_config: NetworkConfig::default(),
            solver_config: SolverConfig::default(),
            solvers: BTreeMap::new(),
            overrides: VoltageOverrides::new(),
        }
    }

    pub fn with_network_config(mut self, config: NetworkConfig) -> Self {
        self.network_config = config;
        self.solvers.clear();
        self
    }

    pub fn with_solver_config(mut self, config: SolverConfig) -> Self {
        self.solver_config = config;
        self.solvers.clear();
        self
    }

    pub fn design(&self) -> &'d Design {
        self.design
    }

    fn find_net(&self, name: &str) -> Result<NetId> {
        self.design
            .find_net(name)
            .ok_or_else(|| PdnError::NetNotFound { net: name.to_string() })
    }

    /// Resolve a corner by name; `None` picks the first corner.
    fn find_corner(&self, name: Option<&str>) -> Result<CornerId> {
        match name {
            Some(name) => self.design.find_corner(name).ok_or_else(|| PdnError::CornerNotFound {
                corner: name.to_string(),
            }),
            None if !self.design.corners.is_empty() => Ok(CornerId(0)),
            None => Err(PdnError::CornerNotFound {
                corner: "<default>".to_string(),
            }),
        }
    }

    /// The cached solver of a net, extracting its network on first use.
    ///
    /// A network built for a floorplanning pass is rebuilt in full once a
    /// full analysis asks for it.
    fn solver(&mut self, net: NetId, floorplanning: bool) -> Result<&mut IrSolver<'d>> {
        match self.solvers.entry(net) {
            Entry::Occupied(entry) => {
                let solver = entry.into_mut();
                if solver.network().is_floorplanning() && !floorplanning {
                    info!("Rebuilding network of {} for full analysis", solver.network().net_name());
                    solver.rebuild(false);
                    solver.network().report_stats();
                }
                Ok(solver)
            }
            Entry::Vacant(entry) => {
                let mut network = IrNetwork::new(self.design, net, self.network_config.clone())?;
                network.set_floorplanning(floorplanning);
                network.construct();
                network.report_stats();
                Ok(entry.insert(IrSolver::new(network, self.solver_config.clone())))
            }
        }
    }

    /// The solver of a net, if one was built.
    pub fn ir_solver(&self, net: &str) -> Option<&IrSolver<'d>> {
        self.design.find_net(net).and_then(|id| self.solvers.get(&id))
    }

    /// Set the supply voltage of a net at one corner, or at every corner
    /// when `corner` is `None`. Cached solutions at those corners are
    /// dropped.
    pub fn set_net_voltage(&mut self, net: &str, corner: Option<&str>, voltage: f64) -> Result<()> {
        let net = self.find_net(net)?;
        let corners: Vec<CornerId> = match corner {
            Some(name) => vec![self.find_corner(Some(name))?],
            None => (0..self.design.corners.len()).map(CornerId).collect(),
        };

        for corner in corners {
            self.overrides.insert((net, corner), voltage);
            // ground nets derive their load currents from the power net
            for solver in self.solvers.values_mut() {
                solver.clear_solution(corner);
            }
        }
        Ok(())
    }

    pub fn set_source_settings(&mut self, settings: SourceSettings) {
        for solver in self.solvers.values_mut() {
            solver.set_source_settings(settings.clone());
        }
        self.solver_config.source_settings = settings;
    }

    /// Cap the node pitch at `pitch_um` microns and rebuild every network.
    pub fn set_node_density_um(&mut self, pitch_um: f64) {
        self.network_config.min_node_pitch_um = pitch_um;
        self.rebuild_networks();
    }

    /// Set the node pitch to `factor` routing pitches and rebuild every
    /// network.
    pub fn set_node_density_factor(&mut self, factor: i64) {
        self.network_config.node_pitch_multiplier = factor;
        self.rebuild_networks();
    }

    fn rebuild_networks(&mut self) {
        let config = &self.network_config;
        for solver in self.solvers.values_mut() {
            solver.set_node_density(config.min_node_pitch_um, config.node_pitch_multiplier);
        }
    }

    /// Check that every node of `net` reaches the top layer.
    ///
    /// Violations are written to `error_file` when given.
    pub fn check_connectivity(&mut self, net: &str, floorplanning: bool, error_file: Option<&Path>) -> Result<bool> {
        let net = self.find_net(net)?;
        let solver = self.solver(net, floorplanning)?;
        let connected = solver.check();
        if let Some(path) = error_file {
            solver.write_error_file(path)?;
        }

        if connected {
            info!("Connectivity check of {} passed", solver.network().net_name());
        } else {
            warn!("Connectivity check of {} failed", solver.network().net_name());
        }
        Ok(connected)
    }

    /// Solve the IR drop of `net` and write the requested reports.
    ///
    /// A voltage source file in `vsrc` is read before any geometry is
    /// extracted, so a malformed file fails fast.
    pub fn analyze_power_grid(
        &mut self,
        net: &str,
        corner: Option<&str>,
        source_type: SourceType,
        vsrc: Option<&Path>,
        outputs: &AnalysisOutputs,
    ) -> Result<IrReport> {
        let net = self.find_net(net)?;
        let corner = self.find_corner(corner)?;
        let dbu_per_micron = self.design.dbu_per_micron;
        let source_file = vsrc.map(|path| read_source_file(path, dbu_per_micron)).transpose()?;
        let overrides = self.overrides.clone();

        let solver = self.solver(net, false)?;
        if !solver.check() {
            if let Some(path) = &outputs.error_file {
                solver.write_error_file(path)?;
            }
            return Err(PdnError::Unconnected {
                net: solver.network().net_name().to_string(),
            });
        }

        solver.solve(corner, source_type, source_file.as_ref(), &overrides)?;

        if let Some(path) = &outputs.voltage_file {
            solver.write_voltage_file(corner, path)?;
        }
        if let Some(path) = &outputs.em_file {
            solver.write_em_file(corner, path)?;
        }
        if let Some(path) = &outputs.error_file {
            solver.write_error_file(path)?;
        }
        if let Some(path) = &outputs.spice_file {
            solver.write_spice_file(corner, path)?;
        }
        if let Some(path) = &outputs.source_file {
            solver.write_source_file(corner, path)?;
        }

        let report = solver.report(corner)?;
        for line in report.to_string().lines() {
            info!("{}", line);
        }
        Ok(report)
    }

    /// Solve `net` and write its SPICE netlist.
    pub fn write_spice_network(
        &mut self,
        net: &str,
        corner: Option<&str>,
        source_type: SourceType,
        vsrc: Option<&Path>,
        path: &Path,
    ) -> Result<()> {
        let outputs = AnalysisOutputs::new().with_spice_file(path);
        self.analyze_power_grid(net, corner, source_type, vsrc, &outputs)?;
        Ok(())
    }

    fn solved(&self, net: &str, corner: Option<&str>) -> Result<(&IrSolver<'d>, CornerId)> {
        let corner = self.find_corner(corner)?;
        let id = self.find_net(net)?;
        match self.solvers.get(&id) {
            Some(solver) if solver.is_solved(corner) => Ok((solver, corner)),
            _ => Err(PdnError::NotSolved {
                net: net.to_string(),
                corner: self.design.corner(corner).name.clone(),
            }),
        }
    }

    /// Summary of a solved net.
    pub fn report(&self, net: &str, corner: Option<&str>) -> Result<IrReport> {
        let (solver, corner) = self.solved(net, corner)?;
        solver.report(corner)
    }

    /// IR drop at every node of one layer of a solved net.
    pub fn ir_drop_map(&self, net: &str, corner: Option<&str>, layer: &str) -> Result<Vec<(Point, f64)>> {
        let layer_id = self
            .design
            .tech
            .find_layer(layer)
            .ok_or_else(|| PdnError::LayerNotFound { layer: layer.to_string() })?;
        let (solver, corner) = self.solved(net, corner)?;
        solver.ir_drop_map(corner, layer_id)
    }

    /// Log network statistics of a net, extracting it if needed.
    pub fn report_stats(&mut self, net: &str) -> Result<()> {
        let net = self.find_net(net)?;
        self.solver(net, false)?.network().report_stats();
        Ok(())
    }
}
