//! Parser for the design DSL.

use std::collections::HashMap;

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::design::{PlacementStatus, SigType};
use crate::error::{PdnError, Result};
use crate::geom::Direction;

/// One positional argument on a statement line.
#[derive(Debug, Clone)]
enum Arg {
    Word(String),
    Number(f64),
}

/// The arguments of one statement line, split into positional values and
/// `key=value` parameters.
#[derive(Debug)]
struct Args {
    line: usize,
    statement: String,
    positional: Vec<Arg>,
    params: HashMap<String, f64>,
}

impl Args {
    fn word(&self, index: usize, what: &str) -> Result<String> {
        match self.positional.get(index) {
            Some(Arg::Word(w)) => Ok(w.clone()),
            Some(Arg::Number(_)) => Err(PdnError::parse(
                self.line,
                format!("{}: expected {} name, got a number", self.statement, what),
            )),
            None => Err(PdnError::parse(self.line, format!("{}: missing {}", self.statement, what))),
        }
    }

    fn number(&self, index: usize, what: &str) -> Result<f64> {
        match self.positional.get(index) {
            Some(Arg::Number(v)) => Ok(*v),
            Some(Arg::Word(w)) => Err(PdnError::parse(
                self.line,
                format!("{}: expected {} value, got '{}'", self.statement, what, w),
            )),
            None => Err(PdnError::parse(self.line, format!("{}: missing {}", self.statement, what))),
        }
    }

    fn rect(&self, start: usize) -> Result<RectDef> {
        Ok([
            self.number(start, "x0")?,
            self.number(start + 1, "y0")?,
            self.number(start + 2, "x1")?,
            self.number(start + 3, "y1")?,
        ])
    }

    fn param(&self, name: &str) -> Result<f64> {
        self.params.get(name).copied().ok_or_else(|| {
            PdnError::parse(self.line, format!("{}: missing parameter '{}='", self.statement, name))
        })
    }

    fn optional_param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    /// Trailing keyword flags after the first `start` positional arguments.
    fn flags(&self, start: usize) -> Vec<String> {
        self.positional
            .iter()
            .skip(start)
            .filter_map(|a| match a {
                Arg::Word(w) => Some(w.to_ascii_lowercase()),
                Arg::Number(_) => None,
            })
            .collect()
    }
}

/// Parser for design DSL.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse the entire design description.
    pub fn parse(&mut self) -> Result<DesignAst> {
        let mut ast = DesignAst::new();

        while self.current.kind != TokenKind::Eof {
            // Skip empty lines
            if self.current.kind == TokenKind::Newline {
                self.advance()?;
                continue;
            }

            match &self.current.kind {
                TokenKind::Directive => {
                    let args = self.collect_args()?;
                    self.parse_directive(&mut ast, args)?;
                }
                TokenKind::Identifier => {
                    let args = self.collect_args()?;
                    self.parse_element(&mut ast, args)?;
                }
                _ => {
                    return Err(PdnError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            // Consume newline or EOF
            if self.current.kind == TokenKind::Newline {
                self.advance()?;
            }
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(PdnError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    fn number_token(&mut self, line: usize) -> Result<f64> {
        let tok = self.expect(TokenKind::Number)?;
        parse_value(&tok.text).ok_or_else(|| PdnError::parse(line, format!("invalid number: {}", tok.text)))
    }

    /// Read the statement keyword and everything up to the end of the line.
    fn collect_args(&mut self) -> Result<Args> {
        let statement = self.current.text.to_ascii_lowercase();
        let line = self.current.line;
        self.advance()?;

        let mut positional = Vec::new();
        let mut params = HashMap::new();

        while self.current.kind != TokenKind::Newline && self.current.kind != TokenKind::Eof {
            match self.current.kind {
                TokenKind::Identifier => {
                    let text = self.current.text.clone();
                    self.advance()?;

                    // Check for param=value syntax
                    if self.current.kind == TokenKind::Equals {
                        self.advance()?;
                        let value = self.number_token(line)?;
                        params.insert(text.to_ascii_lowercase(), value);
                    } else {
                        positional.push(Arg::Word(text));
                    }
                }
                TokenKind::Number => {
                    let value = self.number_token(line)?;
                    positional.push(Arg::Number(value));
                }
                _ => {
                    return Err(PdnError::parse(
                        line,
                        format!("unexpected token {:?} in {}", self.current.text, statement),
                    ));
                }
            }
        }

        Ok(Args {
            line,
            statement,
            positional,
            params,
        })
    }

    fn parse_directive(&mut self, ast: &mut DesignAst, args: Args) -> Result<()> {
        let line = args.line;

        match args.statement.as_str() {
            ".design" => {
                ast.name = Some(args.word(0, "design")?);
            }
            ".units" => {
                let dbu = args.number(0, "units")?;
                if dbu <= 0.0 {
                    return Err(PdnError::parse(line, "database units per micron must be positive"));
                }
                ast.units = Some(dbu);
            }
            ".die" => {
                ast.die = Some(args.rect(0)?);
            }
            ".core" => {
                ast.core = Some(args.rect(0)?);
            }
            ".layer" => {
                ast.layers.push(parse_layer(&args)?);
            }
            ".cutclass" => {
                let cuts = args.param("cuts")?;
                if cuts < 1.0 {
                    return Err(PdnError::parse(line, "cut class must have at least one cut"));
                }
                ast.cut_classes.push(CutClassDef {
                    layer: args.word(0, "layer")?,
                    width: args.param("width")?,
                    length: args.optional_param("length"),
                    cuts: cuts as u32,
                    line,
                });
            }
            ".viadef" => {
                ast.via_defs.push(ViaDefDecl {
                    name: args.word(0, "via")?,
                    bottom: args.word(1, "bottom layer")?,
                    cut: args.word(2, "cut layer")?,
                    top: args.word(3, "top layer")?,
                    line,
                });
            }
            ".net" => {
                let type_str = args.word(1, "net type")?;
                let sig_type = SigType::from_keyword(&type_str)
                    .ok_or_else(|| PdnError::parse(line, format!("unknown net type: {}", type_str)))?;
                ast.nets.push(NetDef {
                    name: args.word(0, "net")?,
                    sig_type,
                    line,
                });
            }
            ".corner" => {
                ast.corners.push(CornerDef {
                    name: args.word(0, "corner")?,
                    voltage: args.optional_param("voltage"),
                    line,
                });
            }
            ".sdcvoltage" => {
                ast.sdc_voltages.push(SdcVoltageDef {
                    net: args.word(0, "net")?,
                    voltage: args.number(1, "voltage")?,
                    line,
                });
            }
            ".power" => {
                ast.powers.push(PowerDef {
                    inst: args.word(0, "instance")?,
                    corner: args.word(1, "corner")?,
                    watts: args.number(2, "power")?,
                    line,
                });
            }
            ".rc" => {
                ast.rcs.push(RcDef {
                    layer: args.word(0, "layer")?,
                    corner: args.word(1, "corner")?,
                    resistance: args.param("res")?,
                    capacitance: args.optional_param("cap").unwrap_or(0.0),
                    line,
                });
            }
            other => {
                return Err(PdnError::parse(line, format!("unknown directive: {}", other)));
            }
        }

        Ok(())
    }

    fn parse_element(&mut self, ast: &mut DesignAst, args: Args) -> Result<()> {
        let line = args.line;

        match args.statement.as_str() {
            "wire" => {
                ast.wires.push(WireDef {
                    net: args.word(0, "net")?,
                    layer: args.word(1, "layer")?,
                    rect: args.rect(2)?,
                    line,
                });
            }
            "viacut" => {
                ast.via_shapes.push(ViaShapeDef {
                    via: args.word(0, "via")?,
                    layer: None,
                    rect: args.rect(1)?,
                    line,
                });
            }
            "viaenc" => {
                ast.via_shapes.push(ViaShapeDef {
                    via: args.word(0, "via")?,
                    layer: Some(args.word(1, "layer")?),
                    rect: args.rect(2)?,
                    line,
                });
            }
            "via" => {
                ast.vias.push(ViaPlacementDef {
                    net: args.word(0, "net")?,
                    via: args.word(1, "via")?,
                    origin: [args.number(2, "x")?, args.number(3, "y")?],
                    line,
                });
            }
            "inst" => {
                let mut status = PlacementStatus::Placed;
                let mut is_pad = false;
                for flag in args.flags(1) {
                    match flag.as_str() {
                        "pad" => is_pad = true,
                        other => {
                            status = PlacementStatus::from_keyword(other).ok_or_else(|| {
                                PdnError::parse(line, format!("unknown instance flag: {}", other))
                            })?;
                        }
                    }
                }
                ast.instances.push(InstDef {
                    name: args.word(0, "instance")?,
                    rect: args.rect(1)?,
                    status,
                    is_pad,
                    line,
                });
            }
            "pin" => {
                ast.pins.push(PinDef {
                    inst: args.word(0, "instance")?,
                    pin: args.word(1, "pin")?,
                    net: args.word(2, "net")?,
                    shape: PinShapeDef::Box {
                        layer: args.word(3, "layer")?,
                        rect: args.rect(4)?,
                    },
                    line,
                });
            }
            "pinvia" => {
                ast.pins.push(PinDef {
                    inst: args.word(0, "instance")?,
                    pin: args.word(1, "pin")?,
                    net: args.word(2, "net")?,
                    shape: PinShapeDef::Via {
                        via: args.word(3, "via")?,
                        origin: [args.number(4, "x")?, args.number(5, "y")?],
                    },
                    line,
                });
            }
            "bpin" => {
                let placed = !args.flags(3).iter().any(|f| f == "unplaced");
                ast.bpins.push(BPinDef {
                    net: args.word(0, "net")?,
                    name: args.word(1, "pin")?,
                    layer: args.word(2, "layer")?,
                    rect: args.rect(3)?,
                    placed,
                    line,
                });
            }
            other => {
                return Err(PdnError::parse(line, format!("unknown statement: {}", other)));
            }
        }

        Ok(())
    }
}

fn parse_layer(args: &Args) -> Result<LayerDef> {
    let line = args.line;
    let name = args.word(0, "layer")?;
    let type_str = args.word(1, "layer type")?;
    let layer_type = LayerType::from_keyword(&type_str)
        .ok_or_else(|| PdnError::parse(line, format!("unknown layer type: {}", type_str)))?;

    match layer_type {
        LayerType::Routing => {
            let dir_str = args.word(2, "direction")?;
            let direction = Direction::from_keyword(&dir_str)
                .ok_or_else(|| PdnError::parse(line, format!("unknown direction: {}", dir_str)))?;
            Ok(LayerDef {
                name,
                layer_type,
                direction,
                pitch: args.optional_param("pitch").unwrap_or(0.0),
                width: args.param("width")?,
                resistance: args.param("res")?,
                line,
            })
        }
        LayerType::Cut => Ok(LayerDef {
            name,
            layer_type,
            direction: Direction::None,
            pitch: 0.0,
            width: 0.0,
            resistance: args.param("res")?,
            line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layers() {
        let input = ".layer M1 routing horizontal pitch=0.4 width=0.2 res=0.1\n.layer V1 cut res=2\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.layers.len(), 2);
        assert_eq!(ast.layers[0].name, "M1");
        assert_eq!(ast.layers[0].layer_type, LayerType::Routing);
        assert_eq!(ast.layers[0].direction, Direction::Horizontal);
        assert!((ast.layers[0].pitch - 0.4).abs() < 1e-12);
        assert_eq!(ast.layers[1].layer_type, LayerType::Cut);
        assert!((ast.layers[1].resistance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_wire_and_via() {
        let input = "WIRE VDD M1 0 -1 100 1\nVIA VDD via12 50 0\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.wires.len(), 1);
        assert_eq!(ast.wires[0].net, "VDD");
        assert_eq!(ast.wires[0].rect, [0.0, -1.0, 100.0, 1.0]);
        assert_eq!(ast.vias[0].via, "via12");
        assert_eq!(ast.vias[0].origin, [50.0, 0.0]);
    }

    #[test]
    fn test_parse_instance_flags() {
        let input = "INST u1 0 0 10 10 fixed pad\nINST u2 0 0 10 10\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.instances[0].status, PlacementStatus::Fixed);
        assert!(ast.instances[0].is_pad);
        assert_eq!(ast.instances[1].status, PlacementStatus::Placed);
        assert!(!ast.instances[1].is_pad);
    }

    #[test]
    fn test_parse_pins() {
        let input = "PIN u1 VDD VDD M1 0 0 1 1\nPINVIA u1 VDD VDD via12 5 5\nBPIN VDD vdd_pad M2 0 0 10 10 unplaced\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.pins.len(), 2);
        assert!(matches!(ast.pins[0].shape, PinShapeDef::Box { .. }));
        assert!(matches!(ast.pins[1].shape, PinShapeDef::Via { .. }));
        assert!(!ast.bpins[0].placed);
    }

    #[test]
    fn test_missing_parameter_is_error() {
        let result = super::super::parse(".layer M1 routing horizontal pitch=0.4 res=0.1");
        assert!(matches!(result, Err(PdnError::ParseError { line: 1, .. })));
    }

    #[test]
    fn test_unknown_statement() {
        let result = super::super::parse("\n\nRESISTOR a b 1");
        assert!(matches!(result, Err(PdnError::ParseError { line: 3, .. })));
    }

    #[test]
    fn test_parse_with_comments() {
        let input = "# supply\n.net VDD power ; the main supply\n.corner tt voltage=1.1\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.nets.len(), 1);
        assert_eq!(ast.nets[0].sig_type, SigType::Power);
        assert_eq!(ast.corners[0].voltage, Some(1.1));
    }
}
