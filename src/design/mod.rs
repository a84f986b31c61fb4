//! Design database: technology, nets, instances and power data.
//!
//! The [`Design`] is the layout collaborator of the analyzer. It is built
//! once from a parsed design file and is read-only afterwards; networks and
//! solvers borrow it.

mod layout;
mod power;
mod tech;
mod types;

pub use layout::{
    BPin, Corner, Design, InstPin, Instance, Net, PinGeometry, PlacementStatus, SigType, ViaDef, Wire,
    DEFAULT_DBU_PER_MICRON,
};
pub use power::{PowerProvider, PowerTable};
pub use tech::{CutClass, LayerKind, Tech, TechLayer};
pub use types::*;
