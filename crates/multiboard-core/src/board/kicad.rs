//! `.kicad_pcb` documents.
//!
//! The file is split into three runs of top-level nodes: everything before the
//! first footprint (header, layers, setup, net table), the footprints, and
//! everything after them (tracks, zones, graphics). Saving writes them back in
//! the same order.

use super::{BoardDocument, BoardStore, Net};
use crate::footprint::Footprint;
use crate::fs::write_atomic;
use anyhow::{Context, Result, bail};
use multiboard_sexpr::{Sexpr, formatter, parse};
use std::path::{Path, PathBuf};

const EMPTY_BOARD: &str = r#"(kicad_pcb
	(version 20240108)
	(generator "multiboard")
	(generator_version "9.0")
	(general
		(thickness 1.6)
		(legacy_teardrops no)
	)
	(paper "A4")
	(layers
		(0 "F.Cu" signal)
		(31 "B.Cu" signal)
		(36 "B.SilkS" user "B.Silkscreen")
		(37 "F.SilkS" user "F.Silkscreen")
		(38 "B.Mask" user)
		(39 "F.Mask" user)
		(44 "Edge.Cuts" user)
		(47 "F.CrtYd" user "F.Courtyard")
		(49 "F.Fab" user)
	)
	(setup
		(pad_to_mask_clearance 0)
	)
	(net 0 "")
)
"#;

/// Board documents stored as KiCad files.
#[derive(Debug, Default, Clone, Copy)]
pub struct KicadBoardStore;

impl BoardStore for KicadBoardStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BoardDocument>> {
        Ok(Box::new(KicadBoard::open(path)?))
    }

    fn create_empty(&self, path: &Path) -> Result<()> {
        write_atomic(path, EMPTY_BOARD)
    }
}

#[derive(Debug, Clone)]
pub struct KicadBoard {
    path: PathBuf,
    head: Vec<Sexpr>,
    footprints: Vec<Footprint>,
    tail: Vec<Sexpr>,
}

impl KicadBoard {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(path, &text).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let root = parse(text)?;
        let Some(items) = root.as_list() else {
            bail!("Board file is not an S-expression list");
        };
        if items.first().and_then(Sexpr::as_sym) != Some("kicad_pcb") {
            bail!("Not a KiCad board file");
        }

        let mut board = Self {
            path: path.to_path_buf(),
            head: vec![items[0].clone()],
            footprints: Vec::new(),
            tail: Vec::new(),
        };
        for node in &items[1..] {
            if matches!(node.tag(), Some("footprint" | "module")) {
                board.footprints.push(Footprint::from_sexpr(node.clone())?);
            } else if board.footprints.is_empty() {
                board.head.push(node.clone());
            } else {
                board.tail.push(node.clone());
            }
        }
        log::debug!(
            "Loaded {} with {} footprints",
            path.display(),
            board.footprints.len()
        );
        Ok(board)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nets(&self) -> Vec<Net> {
        self.head
            .iter()
            .chain(self.tail.iter())
            .filter(|n| n.tag() == Some("net"))
            .filter_map(|n| {
                let list = n.as_list()?;
                Some(Net::new(list.get(1)?.as_i64()?, list.get(2)?.as_atom()?))
            })
            .collect()
    }

    pub fn to_text(&self) -> String {
        let mut items = self.head.clone();
        items.extend(self.footprints.iter().map(Footprint::to_sexpr));
        items.extend(self.tail.iter().cloned());
        formatter::format_tree(&Sexpr::list(items))
    }
}

impl BoardDocument for KicadBoard {
    fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    fn footprint_mut(&mut self, reference: &str) -> Option<&mut Footprint> {
        self.footprints
            .iter_mut()
            .find(|fp| fp.reference() == reference)
    }

    fn add_footprint(&mut self, footprint: Footprint) {
        self.footprints.push(footprint);
    }

    fn remove_footprint(&mut self, reference: &str) -> Option<Footprint> {
        let idx = self
            .footprints
            .iter()
            .position(|fp| fp.reference() == reference)?;
        Some(self.footprints.remove(idx))
    }

    fn net(&self, name: &str) -> Option<Net> {
        self.nets().into_iter().find(|n| n.name == name)
    }

    fn ensure_net(&mut self, name: &str) -> Net {
        let nets = self.nets();
        if let Some(net) = nets.iter().find(|n| n.name == name) {
            return net.clone();
        }
        let code = nets.iter().map(|n| n.code).max().unwrap_or(0) + 1;
        let net = Net::new(code, name);

        // New nets go at the end of the net table, which sits in the header.
        let idx = self
            .head
            .iter()
            .rposition(|n| n.tag() == Some("net"))
            .map(|i| i + 1)
            .unwrap_or(self.head.len());
        self.head.insert(idx, net.to_sexpr());
        net
    }

    fn save(&mut self) -> Result<()> {
        write_atomic(&self.path, &self.to_text())
    }
}
