//! Error types for the PdnSim power-grid analyzer.
//!
//! This module provides a unified error type [`PdnError`] that covers
//! all error conditions that can occur during design-file parsing,
//! network extraction, source placement and solving.
//!
//! Topology anomalies (dangling stripes, unconnected instances) are not
//! errors on their own: the connectivity check reports them as a boolean.
//! Only an attempt to solve an unconnected grid produces [`PdnError::Unconnected`].

use thiserror::Error;

/// Result type alias using [`PdnError`].
pub type Result<T> = std::result::Result<T, PdnError>;

/// Unified error type for all PdnSim operations.
#[derive(Error, Debug)]
pub enum PdnError {
    // ============ Design File Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Reference to a layer that was never declared
    #[error("Unknown layer '{name}' at line {line}")]
    UnknownLayer { name: String, line: usize },

    /// Reference to a net that was never declared
    #[error("Unknown net '{name}' at line {line}")]
    UnknownNet { name: String, line: usize },

    /// Reference to a via definition that was never declared
    #[error("Unknown via definition '{name}' at line {line}")]
    UnknownVia { name: String, line: usize },

    /// Reference to an instance that was never declared
    #[error("Unknown instance '{name}' at line {line}")]
    UnknownInstance { name: String, line: usize },

    /// Reference to a corner that was never declared
    #[error("Unknown corner '{name}' at line {line}")]
    UnknownCorner { name: String, line: usize },

    /// Same object declared twice
    #[error("Duplicate {kind} '{name}' at line {line}")]
    DuplicateDefinition {
        kind: &'static str,
        name: String,
        line: usize,
    },

    /// Structurally invalid design
    #[error("Invalid design: {message}")]
    InvalidDesign { message: String },

    // ============ Configuration Errors ============
    /// Net lookup by name failed
    #[error("Net '{net}' not found in design")]
    NetNotFound { net: String },

    /// Corner lookup by name failed
    #[error("Corner '{corner}' not found in design")]
    CornerNotFound { corner: String },

    /// Layer lookup by name failed
    #[error("Layer '{layer}' not found in design")]
    LayerNotFound { layer: String },

    /// Analysis requested on a signal net
    #[error("{net} is not a supply net")]
    NotSupplyNet { net: String },

    /// Source pattern keyword not recognized
    #[error("Unknown source type '{name}' (expected full, straps or bumps)")]
    UnknownSourceType { name: String },

    /// Malformed record in a voltage source file
    #[error("Expected four values on line {line} of {path}: '{record}'")]
    MalformedSourceRecord {
        path: String,
        line: usize,
        record: String,
    },

    /// A voltage source file declares more than one voltage
    #[error("Voltage source file {path} mixes voltages: {first}V and {other}V (line {line})")]
    MixedSourceVoltages {
        path: String,
        first: f64,
        other: f64,
        line: usize,
    },

    /// Voltage source file contained no records
    #[error("Voltage source file {path} contains no sources")]
    EmptySourceFile { path: String },

    /// No source could be placed on the grid
    #[error("Number of voltage sources on net {net} cannot be 0")]
    NoSources { net: String },

    /// Supply voltage could not be resolved for a net
    #[error("Voltage on net {net} is not set for corner {corner}")]
    MissingVoltage { net: String, corner: String },

    // ============ Topology Errors ============
    /// The network for the net has no nodes
    #[error("Network for net {net} is empty")]
    EmptyNetwork { net: String },

    /// Solve refused because the grid is not fully connected
    #[error("Power grid of net {net} is not connected; run the connectivity check for details")]
    Unconnected { net: String },

    // ============ Solver Errors ============
    /// The sparse matrix could not be assembled
    #[error("Failed to assemble conductance matrix: {message}")]
    MatrixAssembly { message: String },

    /// LU factorization or solve failed
    #[error("LU factorization of the G matrix failed: {message}")]
    Factorization { message: String },

    /// Results were requested for a net/corner pair that was never solved
    #[error("Net {net} has not been solved for corner {corner}")]
    NotSolved { net: String, corner: String },

    // ============ I/O Errors ============
    /// Error reading an input file
    #[error("Failed to read '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing a report file
    #[error("Failed to write '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PdnError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid design error
    pub fn invalid_design(message: impl Into<String>) -> Self {
        Self::InvalidDesign {
            message: message.into(),
        }
    }

    /// Create a factorization error
    pub fn factorization(message: impl Into<String>) -> Self {
        Self::Factorization {
            message: message.into(),
        }
    }

    /// Wrap an I/O error raised while reading `path`
    pub fn file_read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// Wrap an I/O error raised while writing `path`
    pub fn file_write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }
}
