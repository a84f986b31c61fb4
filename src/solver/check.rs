//! Grid connectivity checks.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::design::{BPinId, ITermId};
use crate::network::{IrNetwork, NodeId, NodeKind};

/// Objects a connectivity check found cut off from the top layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityReport {
    /// Grid nodes never reached
    pub unconnected_nodes: Vec<NodeId>,
    /// Instance terminals with no path to the grid
    pub unconnected_iterms: Vec<ITermId>,
    pub unconnected_bpins: Vec<BPinId>,
}

impl ConnectivityReport {
    pub fn is_connected(&self) -> bool {
        self.unconnected_nodes.is_empty() && self.unconnected_iterms.is_empty() && self.unconnected_bpins.is_empty()
    }
}

/// Breadth-first walk from the first top-layer node over every connection.
///
/// Instance terminals of placed instances that produced no node at all are
/// reported as unconnected too. In a floorplanning pass only fixed
/// instances are expected on the grid.
pub fn check_open(network: &IrNetwork<'_>) -> ConnectivityReport {
    let design = network.design();
    let nodes = network.nodes();
    let mut visited = vec![false; nodes.len()];

    if let Some(&start) = network.top_layer_nodes().first() {
        let incident = network.node_connections();
        let connections = network.connections();
        let mut queue = VecDeque::from([start]);
        visited[start.0] = true;

        while let Some(id) = queue.pop_front() {
            for &index in &incident[id.0] {
                if let Some(next) = connections[index].other_node(id) {
                    if !visited[next.0] {
                        visited[next.0] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    let mut report = ConnectivityReport::default();
    for (index, node) in nodes.iter().enumerate() {
        if visited[index] {
            continue;
        }
        match *node.kind() {
            NodeKind::ITerm { iterm } => {
                warn!("Unconnected instance {}", design.iterm_name(iterm));
                report.unconnected_iterms.push(iterm);
            }
            NodeKind::BPin { pin, .. } => {
                warn!("Unconnected block pin {}", design.bpin(pin).name);
                report.unconnected_bpins.push(pin);
            }
            _ => {
                debug!(
                    "Unconnected node {} on {}",
                    node.point(),
                    design.tech.layer(node.layer()).name
                );
                report.unconnected_nodes.push(NodeId(index));
            }
        }
    }

    // instance terminals that never made it into the network
    let anchored: Vec<ITermId> = network
        .iterm_nodes()
        .iter()
        .filter_map(|id| network.node(*id).iterm_id())
        .collect();
    for &iterm in &design.net(network.net()).iterms {
        let inst = design.instance(iterm.inst);
        let expected = inst.status.is_placed() && (!network.is_floorplanning() || inst.status.is_fixed());
        if expected && !anchored.contains(&iterm) && !report.unconnected_iterms.contains(&iterm) {
            warn!("Unconnected instance {}: no pin geometry on the grid", design.iterm_name(iterm));
            report.unconnected_iterms.push(iterm);
        }
    }

    if !report.unconnected_nodes.is_empty() {
        warn!(
            "{} unconnected PDN nodes on net {}",
            report.unconnected_nodes.len(),
            network.net_name()
        );
    }
    report
}

/// Short detection between supply nets is not implemented; always passes.
pub fn check_short(_network: &IrNetwork<'_>) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Design;
    use crate::network::{test_design, NetworkConfig, TEST_GRID};

    fn network(design: &Design) -> IrNetwork<'_> {
        let net = design.find_net("VDD").unwrap();
        let mut network = IrNetwork::new(design, net, NetworkConfig::default()).unwrap();
        network.construct();
        network
    }

    #[test]
    fn test_connected_grid() {
        let design = test_design(TEST_GRID);
        let report = check_open(&network(&design));
        assert!(report.is_connected(), "{:?}", report);
    }

    #[test]
    fn test_unbridged_strap_is_reported() {
        let text = TEST_GRID
            .replace("VIA VDD via12 80 10\n", "")
            .replace("VIA VDD via12 80 50\n", "");
        let design = test_design(&text);
        let network = network(&design);
        let report = check_open(&network);

        assert!(!report.is_connected());
        assert!(report.unconnected_iterms.is_empty());
        let m2 = design.tech.find_layer("M2").unwrap();
        assert!(report
            .unconnected_nodes
            .iter()
            .all(|id| network.node(*id).layer() == m2 && network.node(*id).point().x == 80_000));
        assert!(!report.unconnected_nodes.is_empty());
    }

    #[test]
    fn test_floating_instance_pin() {
        let text = TEST_GRID.replace("PIN u1 VDD VDD M1 40 9.9 50 10.1", "PIN u1 VDD VDD M1 40 30 50 30.2");
        let design = test_design(&text);
        let report = check_open(&network(&design));
        assert_eq!(report.unconnected_iterms.len(), 1);
    }

    #[test]
    fn test_floating_block_pin() {
        let text = format!("{}BPIN VDD vdd_io M1 40 30 42 32\n", TEST_GRID);
        let design = test_design(&text);
        let network = network(&design);
        let report = check_open(&network);

        assert!(!report.is_connected());
        assert_eq!(report.unconnected_bpins.len(), 1);
        assert_eq!(design.bpin(report.unconnected_bpins[0]).name, "vdd_io");
        assert!(report.unconnected_iterms.is_empty());
    }

    #[test]
    fn test_block_pin_on_grid_is_connected() {
        let text = format!("{}BPIN VDD vdd_io M2 19.8 58 20.2 60\n", TEST_GRID);
        let design = test_design(&text);
        let report = check_open(&network(&design));
        assert!(report.is_connected(), "{:?}", report);
    }

    #[test]
    fn test_short_check_passes() {
        let design = test_design(TEST_GRID);
        assert!(check_short(&network(&design)));
    }
}
