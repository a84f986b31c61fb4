//! PdnSim - Power Grid Analyzer
//!
//! Static IR-drop and connectivity analysis of a block's supply nets.
//!
//! # Usage
//!
//! ```bash
//! pdnsim block.pdn --net VDD --corner tt --source-type bumps --voltage-file vdd.csv -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, LevelFilter};
use pdnsim_core::{
    dsl, error::Result, AnalysisOutputs, Design, NetworkConfig, PdnSim, SolverConfig, SourceType,
    DEFAULT_MIN_NODE_PITCH_UM,
};

/// Power-delivery network IR-drop analyzer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the design description file (.pdn)
    #[arg(value_name = "DESIGN_FILE")]
    design_file: PathBuf,

    /// Supply net to analyze
    #[arg(short, long)]
    net: String,

    /// Analysis corner (defaults to the first corner in the design)
    #[arg(short, long)]
    corner: Option<String>,

    /// Source pattern used when no source file or pins are available
    #[arg(long, default_value_t = SourceType::Full)]
    source_type: SourceType,

    /// Voltage source file with `x,y,size,voltage` records in microns
    #[arg(long, value_name = "FILE")]
    vsrc: Option<PathBuf>,

    /// Supply voltage of the net, overriding the design's values
    #[arg(long)]
    voltage: Option<f64>,

    /// Write per-instance voltages to this CSV file
    #[arg(long, value_name = "FILE")]
    voltage_file: Option<PathBuf>,

    /// Write per-segment currents to this CSV file
    #[arg(long, value_name = "FILE")]
    em_file: Option<PathBuf>,

    /// Write the solved network as a SPICE netlist
    #[arg(long, value_name = "FILE")]
    spice_file: Option<PathBuf>,

    /// Write connectivity violations to this file
    #[arg(long, value_name = "FILE")]
    error_file: Option<PathBuf>,

    /// Write the placed sources in voltage source file format
    #[arg(long, value_name = "FILE")]
    source_file: Option<PathBuf>,

    /// Only check connectivity
    #[arg(long)]
    check_only: bool,

    /// Ignore instances that are not fixed (connectivity check only)
    #[arg(long, requires = "check_only")]
    floorplanning: bool,

    /// Upper bound on the node pitch, in microns
    #[arg(long, default_value_t = DEFAULT_MIN_NODE_PITCH_UM)]
    node_density_um: f64,

    /// Model every via as a single node pair
    #[arg(long)]
    single_via: bool,

    /// Dump the G matrix, J vector and node table into this directory
    #[arg(long, value_name = "DIR")]
    debug_dump_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(args: &Args) -> Result<bool> {
    // Parse and resolve the design
    let ast = dsl::parse_file(&args.design_file)?;
    let design = Design::from_ast(ast)?;

    let network_config = NetworkConfig::new()
        .with_min_node_pitch_um(args.node_density_um)
        .with_single_via(args.single_via);
    let mut solver_config = SolverConfig::new();
    if let Some(dir) = &args.debug_dump_dir {
        solver_config = solver_config.with_debug_dump_dir(dir);
    }

    let mut sim = PdnSim::new(&design)
        .with_network_config(network_config)
        .with_solver_config(solver_config);

    if args.check_only {
        return sim.check_connectivity(&args.net, args.floorplanning, args.error_file.as_deref());
    }

    if let Some(voltage) = args.voltage {
        sim.set_net_voltage(&args.net, args.corner.as_deref(), voltage)?;
    }

    let outputs = AnalysisOutputs {
        voltage_file: args.voltage_file.clone(),
        em_file: args.em_file.clone(),
        error_file: args.error_file.clone(),
        spice_file: args.spice_file.clone(),
        source_file: args.source_file.clone(),
    };
    let report = sim.analyze_power_grid(
        &args.net,
        args.corner.as_deref(),
        args.source_type,
        args.vsrc.as_deref(),
        &outputs,
    )?;
    println!("{}", report);
    Ok(true)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
