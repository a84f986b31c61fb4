//! Result summaries and report files.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use log::info;
use ordered_float::OrderedFloat;

use super::check::check_open;
use super::ir_solver::IrSolver;
use crate::design::{CornerId, SigType};
use crate::error::{PdnError, Result};
use crate::network::NodeKind;

/// Summary of one solved net at one corner.
#[derive(Debug, Clone, PartialEq)]
pub struct IrReport {
    pub net: String,
    pub corner: String,
    pub supply_voltage: f64,
    /// Lowest voltage on a power net, highest on a ground net
    pub worst_voltage: f64,
    pub average_voltage: f64,
    pub worst_drop: f64,
    pub average_drop: f64,
    /// Worst drop relative to the power-net voltage, in percent
    pub percent_drop: f64,
    /// Largest current through one wire or via, in amperes
    pub max_current: f64,
    pub average_current: f64,
    pub resistor_count: usize,
    pub node_count: usize,
    pub source_count: usize,
}

impl fmt::Display for IrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "########## IR report #################")?;
        writeln!(f, "Net               : {}", self.net)?;
        writeln!(f, "Corner            : {}", self.corner)?;
        writeln!(f, "Supply voltage    : {:.3e} V", self.supply_voltage)?;
        writeln!(f, "Worstcase voltage : {:.3e} V", self.worst_voltage)?;
        writeln!(f, "Average voltage   : {:.3e} V", self.average_voltage)?;
        writeln!(f, "Average IR drop   : {:.3e} V", self.average_drop)?;
        writeln!(f, "Worstcase IR drop : {:.3e} V", self.worst_drop)?;
        writeln!(f, "Percentage drop   : {:.2} %", self.percent_drop)?;
        writeln!(f, "######################################")?;
        writeln!(f, "Maximum current   : {:.3e} A", self.max_current)?;
        writeln!(f, "Average current   : {:.3e} A", self.average_current)?;
        writeln!(f, "Number of resistors: {}", self.resistor_count)?;
        writeln!(f, "Number of nodes   : {}", self.node_count)?;
        writeln!(f, "Number of sources : {}", self.source_count)?;
        write!(f, "######################################")
    }
}

/// Run a writer against a buffered file, mapping I/O failures to `path`.
fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let run = || -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        body(&mut out)?;
        out.flush()
    };
    run().map_err(|e| PdnError::file_write(path, e))
}

impl<'d> IrSolver<'d> {
    /// Summarize a solved corner.
    pub fn report(&self, corner: CornerId) -> Result<IrReport> {
        let solution = self.require_solution(corner)?;
        let network = self.network();
        let design = self.design();
        let supply = solution.supply_voltage;

        let voltages = &solution.voltages;
        let ordered = voltages.iter().copied().map(OrderedFloat);
        let worst_voltage = if network.sig_type() == SigType::Ground {
            ordered.max()
        } else {
            ordered.min()
        }
        .map_or(supply, |v| v.0);
        let average_voltage = if voltages.is_empty() {
            supply
        } else {
            voltages.iter().sum::<f64>() / voltages.len() as f64
        };
        let worst_drop = (supply - worst_voltage).abs();
        let average_drop = (supply - average_voltage).abs();
        let percent_drop = if solution.nominal_voltage != 0.0 {
            worst_drop / solution.nominal_voltage * 100.0
        } else {
            0.0
        };

        // pin links are not metal
        let mut max_current: f64 = 0.0;
        let mut total_current = 0.0;
        let mut counted = 0usize;
        for connection in network.connections() {
            let Some((a, b)) = connection.endpoints() else {
                continue;
            };
            if network.node(a).is_pin_anchor() || network.node(b).is_pin_anchor() {
                continue;
            }
            let current =
                (solution.voltage(a) - solution.voltage(b)).abs() / connection.resistance(&solution.resistance);
            max_current = max_current.max(current);
            total_current += current;
            counted += 1;
        }
        let average_current = if counted > 0 {
            total_current / counted as f64
        } else {
            0.0
        };

        Ok(IrReport {
            net: network.net_name().to_string(),
            corner: design.corner(corner).name.clone(),
            supply_voltage: supply,
            worst_voltage,
            average_voltage,
            worst_drop,
            average_drop,
            percent_drop,
            max_current,
            average_current,
            resistor_count: network.connections().len(),
            node_count: network.node_count(true),
            source_count: solution.sources.len(),
        })
    }

    /// Instance voltages as CSV, one row per instance terminal.
    pub fn write_voltage_file(&self, corner: CornerId, path: &Path) -> Result<()> {
        let solution = self.require_solution(corner)?;
        let network = self.network();
        let design = self.design();

        write_file(path, |out| {
            writeln!(out, "Instance name, X location, Y location, Voltage")?;
            for &id in network.iterm_nodes() {
                let node = network.node(id);
                let Some(iterm) = node.iterm_id() else {
                    continue;
                };
                writeln!(
                    out,
                    "{}, {}, {}, {:.6}",
                    design.instance(iterm.inst).name,
                    design.to_microns(node.point().x),
                    design.to_microns(node.point().y),
                    solution.voltage(id)
                )?;
            }
            Ok(())
        })?;
        info!("Wrote instance voltages to {}", path.display());
        Ok(())
    }

    /// Per-segment currents as CSV.
    pub fn write_em_file(&self, corner: CornerId, path: &Path) -> Result<()> {
        let solution = self.require_solution(corner)?;
        let network = self.network();
        let tech = &self.design().tech;
        let net = network.net_name();

        write_file(path, |out| {
            writeln!(out, "Segment name, Current, Node 1, Node 2")?;
            let mut segment = 0usize;
            for connection in network.connections() {
                let Some((a, b)) = connection.endpoints() else {
                    continue;
                };
                let (node_a, node_b) = (network.node(a), network.node(b));
                if node_a.is_pin_anchor() || node_b.is_pin_anchor() {
                    continue;
                }
                let current =
                    (solution.voltage(a) - solution.voltage(b)).abs() / connection.resistance(&solution.resistance);
                writeln!(
                    out,
                    "seg_{}, {:.6e}, {}, {}",
                    segment,
                    current,
                    node_a.name(net, tech),
                    node_b.name(net, tech)
                )?;
                segment += 1;
            }
            Ok(())
        })?;
        info!("Wrote segment currents to {}", path.display());
        Ok(())
    }

    /// Unconnected nodes, instances and block pins as violation markers.
    pub fn write_error_file(&self, path: &Path) -> Result<()> {
        let network = self.network();
        let design = self.design();
        let tech = &design.tech;
        let report = match self.connectivity() {
            Some(report) => report.clone(),
            None => check_open(network),
        };
        let bottom = network
            .bottom_layer()
            .map(|layer| tech.layer(layer).name.as_str())
            .unwrap_or("");

        write_file(path, |out| {
            for &id in &report.unconnected_nodes {
                let node = network.node(id);
                let x = design.to_microns(node.point().x);
                let y = design.to_microns(node.point().y);
                writeln!(out, "violation type: Unconnected PDN node")?;
                writeln!(out, "  srcs: ")?;
                writeln!(
                    out,
                    "    bbox = ({}, {}) - ({}, {}) on Layer {}",
                    x - 0.05,
                    y - 0.05,
                    x + 0.05,
                    y + 0.05,
                    tech.layer(node.layer()).name
                )?;
            }

            let mut reported = Vec::new();
            for iterm in &report.unconnected_iterms {
                if reported.contains(&iterm.inst) {
                    continue;
                }
                reported.push(iterm.inst);
                let inst = design.instance(iterm.inst);
                writeln!(out, "violation type: Unconnected instance")?;
                writeln!(out, "  srcs: inst:{}", inst.name)?;
                writeln!(
                    out,
                    "    bbox = ({}, {}) - ({}, {}) on Layer {}",
                    design.to_microns(inst.bbox.xlo),
                    design.to_microns(inst.bbox.ylo),
                    design.to_microns(inst.bbox.xhi),
                    design.to_microns(inst.bbox.yhi),
                    bottom
                )?;
            }

            for &pin in report.unconnected_bpins.iter().unique() {
                let bpin = design.bpin(pin);
                writeln!(out, "violation type: Unconnected block pin")?;
                writeln!(out, "  srcs: bpin:{}", bpin.name)?;
                for &(layer, rect) in bpin.boxes.iter().unique() {
                    writeln!(
                        out,
                        "    bbox = ({}, {}) - ({}, {}) on Layer {}",
                        design.to_microns(rect.xlo),
                        design.to_microns(rect.ylo),
                        design.to_microns(rect.xhi),
                        design.to_microns(rect.yhi),
                        tech.layer(layer).name
                    )?;
                }
            }
            Ok(())
        })?;
        info!("Wrote connectivity violations to {}", path.display());
        Ok(())
    }

    /// The solved network as a SPICE deck.
    ///
    /// Every connection becomes a resistor, every load a current source to
    /// ground, and every supply a voltage source behind its 1 ohm resistor.
    pub fn write_spice_file(&self, corner: CornerId, path: &Path) -> Result<()> {
        let solution = self.require_solution(corner)?;
        let network = self.network();
        let tech = &self.design().tech;
        let net = network.net_name();
        let name = |id: crate::network::NodeId| network.node(id).name(net, tech);

        write_file(path, |out| {
            writeln!(out, "* {} IR drop network", net)?;
            for (index, connection) in network.connections().iter().enumerate() {
                let Some((a, b)) = connection.endpoints() else {
                    continue;
                };
                writeln!(
                    out,
                    "R{} {} {} {:e}",
                    index,
                    name(a),
                    name(b),
                    connection.resistance(&solution.resistance)
                )?;
            }

            let mut load = 0usize;
            for (index, &injected) in solution.currents.iter().enumerate() {
                if injected.abs() > 1e-18 {
                    let id = crate::network::NodeId(index);
                    writeln!(out, "I{} {} 0 {:e}", load, name(id), -injected)?;
                    load += 1;
                }
            }

            for (index, source) in solution.sources.iter().enumerate() {
                let Some(target) = source.node.source_target() else {
                    continue;
                };
                let supply = format!("{}_source{}", net, index);
                writeln!(out, "RS{} {} {} 1", index, supply, name(target))?;
                writeln!(out, "V{} {} 0 {}", index, supply, solution.supply_voltage)?;
            }

            writeln!(out, ".OPTION NUMDGT=6")?;
            writeln!(out, ".OP")?;
            writeln!(out, ".END")?;
            Ok(())
        })?;
        info!("Wrote SPICE netlist to {}", path.display());
        Ok(())
    }

    /// The sources of a solved corner as a voltage source file.
    pub fn write_source_file(&self, corner: CornerId, path: &Path) -> Result<()> {
        let solution = self.require_solution(corner)?;
        let design = self.design();

        write_file(path, |out| {
            for source in &solution.sources {
                let NodeKind::Source { shape, .. } = *source.node.kind() else {
                    continue;
                };
                let center = shape.center();
                writeln!(
                    out,
                    "{},{},{},{}",
                    design.to_microns(center.x),
                    design.to_microns(center.y),
                    design.to_microns(shape.max_dxdy()),
                    solution.supply_voltage
                )?;
            }
            Ok(())
        })?;
        info!("Wrote {} sources to {}", solution.sources.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Design;
    use crate::network::{test_design, IrNetwork, NetworkConfig, TEST_GRID};
    use crate::solver::ir_solver::tests::MESH;
    use crate::solver::sources::read_source_file;
    use crate::solver::{SolverConfig, SourceType, VoltageOverrides};
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn solved<'d>(design: &'d Design, net: &str) -> IrSolver<'d> {
        let corner = design.find_corner("tt").unwrap();
        let net = design.find_net(net).unwrap();
        let network = IrNetwork::new(design, net, NetworkConfig::default()).unwrap();
        let mut solver = IrSolver::new(network, SolverConfig::default());
        solver
            .solve(corner, SourceType::Full, None, &VoltageOverrides::new())
            .unwrap();
        solver
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pdnsim_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_power_net_report() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let solver = solved(&design, "VDD");
        let report = solver.report(corner).unwrap();

        assert_eq!(report.net, "VDD");
        assert_eq!(report.corner, "tt");
        assert!(report.worst_voltage < report.average_voltage);
        assert!(report.worst_drop > 0.0);
        assert!(report.worst_drop >= report.average_drop);
        assert_relative_eq!(report.percent_drop, report.worst_drop * 100.0, max_relative = 1e-9);
        assert!(report.max_current > 0.0);
        assert!(report.max_current <= 1e-3 + 1e-12);
        assert_eq!(report.resistor_count, solver.network().connections().len());
        assert!(report.to_string().contains("Worstcase IR drop"));
    }

    #[test]
    fn test_ground_net_worst_is_highest() {
        let text = MESH
            .replace("WIRE VDD", "WIRE VSS")
            .replace("VIA VDD", "VIA VSS")
            .replace("PIN u1 VDD VDD", "PIN u1 VSS VSS");
        let design = test_design(&text);
        let corner = design.find_corner("tt").unwrap();
        let solver = solved(&design, "VSS");
        let report = solver.report(corner).unwrap();

        let highest = solver
            .solution(corner)
            .unwrap()
            .voltages
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(report.worst_voltage, highest);
        assert_relative_eq!(report.worst_drop, highest);
    }

    #[test]
    fn test_voltage_and_em_files() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let solver = solved(&design, "VDD");

        let voltage_path = temp_path("voltage.csv");
        solver.write_voltage_file(corner, &voltage_path).unwrap();
        let text = std::fs::read_to_string(&voltage_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Instance name, X location, Y location, Voltage");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("u1, 10, 10, 0.99"));

        let em_path = temp_path("em.csv");
        solver.write_em_file(corner, &em_path).unwrap();
        let text = std::fs::read_to_string(&em_path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Segment name, Current, Node 1, Node 2"));
        assert!(lines.next().unwrap().starts_with("seg_0, "));

        std::fs::remove_file(voltage_path).ok();
        std::fs::remove_file(em_path).ok();
    }

    #[test]
    fn test_spice_file() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let solver = solved(&design, "VDD");
        let path = temp_path("net.sp");
        solver.write_spice_file(corner, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let resistors = text.lines().filter(|l| l.starts_with('R') && !l.starts_with("RS")).count();
        assert_eq!(resistors, solver.network().connections().len());
        assert_eq!(text.lines().filter(|l| l.starts_with('I')).count(), 1);
        let sources = solver.solution(corner).unwrap().sources.len();
        assert_eq!(text.lines().filter(|l| l.starts_with("RS")).count(), sources);
        assert_eq!(text.lines().filter(|l| l.starts_with('V')).count(), sources);
        assert!(text.ends_with(".OPTION NUMDGT=6\n.OP\n.END\n"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_source_file_round_trip() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let solver = solved(&design, "VDD");
        let path = temp_path("sources.csv");
        solver.write_source_file(corner, &path).unwrap();

        let file = read_source_file(&path, design.dbu_per_micron).unwrap();
        assert_eq!(file.sites.len(), solver.solution(corner).unwrap().sources.len());
        assert_relative_eq!(file.voltage, 1.0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_error_file_lists_unconnected() {
        let text = TEST_GRID
            .replace("VIA VDD via12 80 10\n", "")
            .replace("VIA VDD via12 80 50\n", "");
        let design = test_design(&text);
        let net = design.find_net("VDD").unwrap();
        let network = IrNetwork::new(&design, net, NetworkConfig::default()).unwrap();
        let mut solver = IrSolver::new(network, SolverConfig::default());
        assert!(!solver.check());

        let path = temp_path("errors.rpt");
        solver.write_error_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let violations = text.lines().filter(|l| *l == "violation type: Unconnected PDN node").count();
        assert_eq!(violations, solver.connectivity().unwrap().unconnected_nodes.len());
        assert!(text.contains("on Layer M2"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_error_file_lists_block_pins() {
        let text = format!("{}BPIN VDD vdd_io M1 40 30 42 32\n", TEST_GRID);
        let design = test_design(&text);
        let net = design.find_net("VDD").unwrap();
        let network = IrNetwork::new(&design, net, NetworkConfig::default()).unwrap();
        let mut solver = IrSolver::new(network, SolverConfig::default());
        assert!(!solver.check());

        let path = temp_path("bpin_errors.rpt");
        solver.write_error_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = text.lines().collect();
        let at = lines
            .iter()
            .position(|l| *l == "violation type: Unconnected block pin")
            .unwrap();
        assert_eq!(lines[at + 1], "  srcs: bpin:vdd_io");
        assert_eq!(lines[at + 2], "    bbox = (40, 30) - (42, 32) on Layer M1");
    }

    #[test]
    fn test_report_requires_solution() {
        let design = test_design(MESH);
        let corner = design.find_corner("tt").unwrap();
        let net = design.find_net("VDD").unwrap();
        let network = IrNetwork::new(&design, net, NetworkConfig::default()).unwrap();
        let solver = IrSolver::new(network, SolverConfig::default());
        assert!(matches!(solver.report(corner), Err(PdnError::NotSolved { .. })));
    }
}
