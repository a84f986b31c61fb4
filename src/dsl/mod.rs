//! DSL (Domain Specific Language) parser for power-grid design descriptions.
//!
//! This module provides a line-oriented text format that carries everything
//! the analyzer needs about one block: the layer stack, via definitions,
//! supply nets with their wires and vias, instances with their power pins,
//! block pins, and per-corner power/parasitic data.
//!
//! # Grammar Overview
//!
//! ```text
//! design      = { line }
//! line        = comment | directive | element | empty
//! comment     = ('#' | ';') { any_char }
//! directive   = '.' directive_name { argument }
//! element     = keyword { argument }
//! argument    = identifier | number | identifier '=' number
//!
//! number      = ['-'] digit+ ['.' digit+] [('e'|'E') ['-'|'+'] digit+] [unit_suffix]
//! unit_suffix = 'p' | 'n' | 'u' | 'm' | 'k' | 'M' | 'G'
//! ```
//!
//! Commas are treated as whitespace. All coordinates are in microns.
//!
//! # Directives
//!
//! | Directive | Syntax |
//! |-----------|--------|
//! | .design | `.design <name>` |
//! | .units | `.units <dbu per micron>` |
//! | .die / .core | `.die x0 y0 x1 y1` |
//! | .layer | `.layer <name> routing <horizontal\|vertical\|none> [pitch=] width= res=` |
//! | .layer | `.layer <name> cut res=` |
//! | .cutclass | `.cutclass <layer> width= [length=] cuts=` |
//! | .viadef | `.viadef <name> <bottom> <cut> <top>` |
//! | .net | `.net <name> <power\|ground\|signal>` |
//! | .corner | `.corner <name> [voltage=]` |
//! | .sdcvoltage | `.sdcvoltage <net> <volts>` |
//! | .power | `.power <inst> <corner> <watts>` |
//! | .rc | `.rc <layer> <corner> res= [cap=]` |
//!
//! # Elements
//!
//! | Keyword | Syntax |
//! |---------|--------|
//! | WIRE | `WIRE <net> <layer> x0 y0 x1 y1` |
//! | VIACUT | `VIACUT <viadef> x0 y0 x1 y1` |
//! | VIAENC | `VIAENC <viadef> <layer> x0 y0 x1 y1` |
//! | VIA | `VIA <net> <viadef> x y` |
//! | INST | `INST <name> x0 y0 x1 y1 [placed\|fixed\|unplaced] [pad]` |
//! | PIN | `PIN <inst> <pin> <net> <layer> x0 y0 x1 y1` |
//! | PINVIA | `PINVIA <inst> <pin> <net> <viadef> x y` |
//! | BPIN | `BPIN <net> <name> <layer> x0 y0 x1 y1 [unplaced]` |
//!
//! # Example
//!
//! ```text
//! .units 1000
//! .layer M1 routing horizontal pitch=0.4 width=0.2 res=0.1
//! .net VDD power
//! .corner tt voltage=1.0
//!
//! WIRE VDD M1 0 -0.1 50 0.1
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::error::{PdnError, Result};

/// Parse a design DSL string into an AST.
pub fn parse(input: &str) -> Result<DesignAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a design DSL file.
pub fn parse_file(path: &std::path::Path) -> Result<DesignAst> {
    let content = std::fs::read_to_string(path).map_err(|e| PdnError::file_read(path, e))?;
    parse(&content)
}
