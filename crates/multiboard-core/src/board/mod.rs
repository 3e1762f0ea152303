//! Board documents: the narrow surface reconciliation needs from a layout.
//!
//! - [`kicad`] reads and writes `.kicad_pcb` files
//! - [`memory`] keeps documents in a shared map, for tests and dry runs

pub mod kicad;
pub mod memory;

use crate::footprint::Footprint;
use anyhow::Result;
use multiboard_sexpr::Sexpr;
use std::path::Path;

pub use kicad::{KicadBoard, KicadBoardStore};
pub use memory::MemoryBoardStore;

/// A named net with its board-local code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Net {
    pub code: i64,
    pub name: String,
}

impl Net {
    pub fn new(code: i64, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }

    /// `(net 3 "GND")`
    pub fn to_sexpr(&self) -> Sexpr {
        Sexpr::list(vec![
            Sexpr::symbol("net"),
            Sexpr::int(self.code),
            Sexpr::string(&self.name),
        ])
    }
}

/// An open board layout.
pub trait BoardDocument {
    fn footprints(&self) -> &[Footprint];

    fn footprint(&self, reference: &str) -> Option<&Footprint> {
        self.footprints().iter().find(|fp| fp.reference() == reference)
    }

    fn footprint_mut(&mut self, reference: &str) -> Option<&mut Footprint>;

    fn add_footprint(&mut self, footprint: Footprint);

    fn remove_footprint(&mut self, reference: &str) -> Option<Footprint>;

    fn net(&self, name: &str) -> Option<Net>;

    /// Look up `name`, creating it with the next free code if needed.
    fn ensure_net(&mut self, name: &str) -> Net;

    /// Write the document back to where it was opened from.
    fn save(&mut self) -> Result<()>;
}

/// Opens and creates board documents by path.
pub trait BoardStore {
    fn exists(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn BoardDocument>>;

    /// Create a board with no footprints and only the unconnected net.
    fn create_empty(&self, path: &Path) -> Result<()>;
}
