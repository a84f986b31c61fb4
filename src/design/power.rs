//! Power and parasitic data per analysis corner.

use rustc_hash::FxHashMap;

use super::types::{CornerId, InstId, LayerId, NetId};

/// Supplies the electrical data the solver needs for a corner.
///
/// Implementations return zero (or `None`) for data they do not have; the
/// solver decides how to fall back.
pub trait PowerProvider {
    /// Total power drawn by an instance, in watts.
    fn instance_power(&self, inst: InstId, corner: CornerId) -> f64;

    /// Layer parasitics as `(resistance, capacitance)`.
    ///
    /// Routing layers report ohm per meter of length for a unit-width wire
    /// (so that multiplying by the wire width in meters gives ohm per
    /// square); cut layers report ohm per cut.
    fn layer_rc(&self, layer: LayerId, corner: CornerId) -> (f64, f64);

    /// Voltage set on the net by design constraints.
    fn sdc_voltage(&self, net: NetId, corner: CornerId) -> Option<f64>;

    /// Default supply voltage of the corner's operating conditions.
    fn pvt_voltage(&self, corner: CornerId) -> Option<f64>;
}

/// Table-backed [`PowerProvider`], filled from the design file.
#[derive(Debug, Clone, Default)]
pub struct PowerTable {
    instance_power: FxHashMap<(InstId, CornerId), f64>,
    layer_rc: FxHashMap<(LayerId, CornerId), (f64, f64)>,
    sdc_voltage: FxHashMap<NetId, f64>,
    pvt_voltage: FxHashMap<CornerId, f64>,
}

impl PowerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_instance_power(&mut self, inst: InstId, corner: CornerId, watts: f64) {
        self.instance_power.insert((inst, corner), watts);
    }

    pub fn set_layer_rc(&mut self, layer: LayerId, corner: CornerId, resistance: f64, capacitance: f64) {
        self.layer_rc.insert((layer, corner), (resistance, capacitance));
    }

    pub fn set_sdc_voltage(&mut self, net: NetId, voltage: f64) {
        self.sdc_voltage.insert(net, voltage);
    }

    pub fn set_pvt_voltage(&mut self, corner: CornerId, voltage: f64) {
        self.pvt_voltage.insert(corner, voltage);
    }
}

impl PowerProvider for PowerTable {
    fn instance_power(&self, inst: InstId, corner: CornerId) -> f64 {
        self.instance_power.get(&(inst, corner)).copied().unwrap_or(0.0)
    }

    fn layer_rc(&self, layer: LayerId, corner: CornerId) -> (f64, f64) {
        self.layer_rc.get(&(layer, corner)).copied().unwrap_or((0.0, 0.0))
    }

    fn sdc_voltage(&self, net: NetId, _corner: CornerId) -> Option<f64> {
        self.sdc_voltage.get(&net).copied()
    }

    fn pvt_voltage(&self, corner: CornerId) -> Option<f64> {
        self.pvt_voltage.get(&corner).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entries_default() {
        let mut table = PowerTable::new();
        table.set_instance_power(InstId(0), CornerId(0), 1e-3);
        table.set_pvt_voltage(CornerId(0), 1.1);

        assert_eq!(table.instance_power(InstId(0), CornerId(0)), 1e-3);
        assert_eq!(table.instance_power(InstId(1), CornerId(0)), 0.0);
        assert_eq!(table.layer_rc(LayerId(0), CornerId(0)), (0.0, 0.0));
        assert_eq!(table.pvt_voltage(CornerId(0)), Some(1.1));
        assert_eq!(table.sdc_voltage(NetId(0), CornerId(0)), None);
    }
}
