//! Resistive network extraction.
//!
//! An [`IrNetwork`] turns the wires, vias and pins of one supply net into
//! [`Node`]s joined by [`Connection`]s. Each layer's metal is cut into
//! [`Shape`]s; a shape seeds nodes at its center and where it meets its
//! neighbours, thins them out to the layer's node pitch and finally wires
//! its surviving nodes together.

mod connection;
mod ir_network;
mod node;
mod shape;
mod spatial;

pub use connection::{Connection, ConnectionKind, ResistanceMap, TERM_RESISTANCE};
pub use ir_network::{IrNetwork, NetworkConfig, DEFAULT_MIN_NODE_PITCH_UM, DEFAULT_NODE_PITCH_MULTIPLIER};
pub use node::{Node, NodeId, NodeKind};
pub use shape::{Shape, ShapeId};
pub use spatial::{NodeTree, ShapeTree};

#[cfg(test)]
pub(crate) use ir_network::tests::{design as test_design, GRID as TEST_GRID};
