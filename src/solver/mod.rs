//! Static IR-drop solver.
//!
//! This module turns an extracted [`IrNetwork`](crate::network::IrNetwork)
//! into a linear system and solves it.
//!
//! ## Modified Nodal Analysis
//!
//! Each grid node contributes one row. Wires, vias and pin links stamp their
//! conductance; instance loads enter the source vector. Every supply adds a
//! row of its own:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ B' -1 ] [ s ] = [ V ]
//! ```
//!
//! where:
//! - G is the conductance matrix of the grid
//! - B couples each supply row to the grid node it feeds
//! - v is the vector of node voltages
//! - s holds `v[node] - V`, the negated current of each supply
//! - i is the load current injected at each node
//! - V is the supply voltage
//!
//! This is an ideal source behind a 1 ohm resistor, so several supplies may
//! feed the same node. The system is factorized with a sparse LU.

mod check;
mod ir_solver;
mod matrix;
mod report;
mod sources;

pub use check::{check_open, check_short, ConnectivityReport};
pub use ir_solver::{IrSolver, Solution, SolverConfig, SourceResult, VoltageOverrides};
pub use matrix::SparseSystem;
pub use report::IrReport;
pub use sources::{
    generate_source_nodes, parse_source_records, read_source_file, SourceFile, SourceSettings, SourceType,
    DEFAULT_BUMP_INTERVAL, DEFAULT_BUMP_PITCH_UM, DEFAULT_BUMP_SIZE_UM, DEFAULT_STRAP_TRACK_PITCH,
};

#[cfg(test)]
pub(crate) use ir_solver::tests::MESH as TEST_MESH;
