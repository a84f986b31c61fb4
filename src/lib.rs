//! # PdnSim Core
//!
//! Static IR-drop and connectivity analysis for chip power-delivery networks.
//!
//! This library provides:
//! - A line-oriented format for describing a block's metal stack, supply
//!   wiring, instances and per-corner power data
//! - Extraction of one supply net into a resistive network
//! - Connectivity checking from the top metal layer down to every instance
//! - Modified Nodal Analysis (MNA) of the network with a sparse LU solver
//! - Voltage, current, SPICE and violation reports
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`dsl`] - Parser for the design description language
//! - [`design`] - Resolved design database and power data
//! - [`geom`] - Integer geometry and rectilinear decomposition
//! - [`network`] - Node/connection network extraction
//! - [`solver`] - Source placement, matrix assembly, solving and reports
//! - [`analysis`] - The [`PdnSim`] driver tying it together
//!
//! ## Usage
//!
//! ```bash
//! pdnsim block.pdn --net VDD --corner tt --voltage-file vdd.csv
//! ```
//!
//! ```no_run
//! use pdnsim_core::{dsl, AnalysisOutputs, Design, PdnSim, SourceType};
//!
//! let ast = dsl::parse_file("block.pdn".as_ref())?;
//! let design = Design::from_ast(ast)?;
//! let mut sim = PdnSim::new(&design);
//! let report = sim.analyze_power_grid("VDD", None, SourceType::Full, None, &AnalysisOutputs::new())?;
//! println!("{}", report);
//! # Ok::<(), pdnsim_core::PdnError>(())
//! ```
//!
//! ## Analysis Method
//!
//! For each supply net and corner:
//!
//! 1. Cut the net's metal into shapes and seed nodes at wire crossings,
//!    vias and pins, thinned to the layer's node pitch
//! 2. Check that every node is reachable from the top layer
//! 3. Place voltage sources on the top layer
//! 4. Assemble G·V = J, with instance power turned into load current
//! 5. Factorize and solve for node voltages

pub mod analysis;
pub mod design;
pub mod dsl;
pub mod error;
pub mod geom;
pub mod network;
pub mod solver;

// Re-export main types for convenience
pub use analysis::{AnalysisOutputs, PdnSim};
pub use design::Design;
pub use error::{PdnError, Result};
pub use network::{IrNetwork, NetworkConfig, DEFAULT_MIN_NODE_PITCH_UM};
pub use solver::{IrReport, IrSolver, SolverConfig, SourceSettings, SourceType};
