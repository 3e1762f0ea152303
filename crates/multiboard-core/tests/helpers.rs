#![allow(dead_code)]

use anyhow::{Result, bail};
use assert_fs::TempDir;
use assert_fs::prelude::*;
use multiboard_core::MultiBoardManager;
use multiboard_core::board::MemoryBoardStore;
use multiboard_core::board::memory::MemoryBoard;
use multiboard_core::footprint::Footprint;
use multiboard_core::library::{FootprintLoader, FootprintResolver};
use multiboard_core::tools::{DesignRuleChecker, NetlistExporter};
use multiboard_kicad::DrcReport;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const CONFIG: &str = r#"{
  "version": "12.0",
  "root_schematic": "main.kicad_sch",
  "boards": {
    "A": { "name": "A", "pcb_path": "boards/A/A.kicad_pcb" },
    "B": {
      "name": "B",
      "pcb_path": "boards/B/B.kicad_pcb",
      "ports": { "VBUS": { "name": "VBUS", "side": "left", "position": 0.25 } }
    }
  }
}"#;

pub const NETLIST: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<export version="E">
  <components>
    <comp ref="R1">
      <value>10k</value>
      <footprint>R:R_0603</footprint>
      <tstamps>11111111-0000-4000-8000-000000000001</tstamps>
    </comp>
    <comp ref="R2">
      <value>1k</value>
      <footprint>R:R_0603</footprint>
      <tstamps>11111111-0000-4000-8000-000000000002</tstamps>
    </comp>
    <comp ref="C1">
      <value>100n</value>
      <footprint>C:C_0402</footprint>
      <tstamps>11111111-0000-4000-8000-000000000003</tstamps>
    </comp>
    <comp ref="U1">
      <value>MCU</value>
      <footprint>R:Nope</footprint>
    </comp>
    <comp ref="R9">
      <value>DNP</value>
      <footprint>R:R_0603</footprint>
    </comp>
    <comp ref="#PWR01">
      <value>GND</value>
      <footprint>power:GND</footprint>
    </comp>
  </components>
  <nets>
    <net code="1" name="GND">
      <node ref="R1" pin="2"/>
      <node ref="C1" pin="2"/>
    </net>
    <net code="2" name="/VIN">
      <node ref="R1" pin="1"/>
      <node ref="R2" pin="1"/>
    </net>
  </nets>
</export>
"##;

const TWO_PAD: &str = r#"(footprint "X" (layer "F.Cu")
  (property "Reference" "REF**")
  (property "Value" "X")
  (pad "1" smd rect (at -0.8 0) (size 0.9 0.95) (layers "F.Cu" "F.Mask"))
  (pad "2" smd rect (at 0.8 0) (size 0.9 0.95) (layers "F.Cu" "F.Mask")))"#;

/// Writes whatever netlist the test currently wants.
pub struct FixtureExporter(pub Rc<RefCell<String>>);

impl NetlistExporter for FixtureExporter {
    fn export(&self, _schematic: &Path, output: &Path, _working_dir: &Path) -> Result<()> {
        std::fs::write(output, self.0.borrow().as_bytes())?;
        Ok(())
    }
}

pub struct FailingExporter;

impl NetlistExporter for FailingExporter {
    fn export(&self, _schematic: &Path, _output: &Path, _working_dir: &Path) -> Result<()> {
        bail!("eeschema crashed")
    }
}

/// Knows a fixed set of footprint names and records every lookup.
pub struct FixtureLoader {
    pub known: &'static [&'static str],
    pub lookups: Rc<RefCell<Vec<String>>>,
}

impl FootprintLoader for FixtureLoader {
    fn load(&self, _library: &Path, name: &str) -> Result<Footprint> {
        self.lookups.borrow_mut().push(name.to_string());
        if !self.known.iter().any(|known| *known == name) {
            bail!("{name} is not in the library");
        }
        Footprint::from_library(TWO_PAD, name)
    }
}

pub struct CannedDrc(pub &'static str);

impl DesignRuleChecker for CannedDrc {
    fn check(&self, _pcb: &Path) -> Result<DrcReport> {
        DrcReport::from_json(self.0)
    }
}

pub struct FailingDrc;

impl DesignRuleChecker for FailingDrc {
    fn check(&self, _pcb: &Path) -> Result<DrcReport> {
        bail!("kicad-cli not found")
    }
}

/// A project on disk with its boards held in memory.
pub struct Fixture {
    pub temp: TempDir,
    pub store: MemoryBoardStore,
    pub netlist: Rc<RefCell<String>>,
    pub lookups: Rc<RefCell<Vec<String>>>,
    pub manager: MultiBoardManager,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Self::with_checker(CannedDrc("{}"))
    }

    pub fn with_checker(checker: impl DesignRuleChecker + 'static) -> Result<Self> {
        Self::build(FixtureExporter, checker)
    }

    pub fn with_exporter(exporter: impl NetlistExporter + 'static) -> Result<Self> {
        Self::build(|_| exporter, CannedDrc("{}"))
    }

    fn build<E: NetlistExporter + 'static>(
        exporter: impl FnOnce(Rc<RefCell<String>>) -> E,
        checker: impl DesignRuleChecker + 'static,
    ) -> Result<Self> {
        let temp = TempDir::new()?;
        temp.child(".kicad_multiboard.json").write_str(CONFIG)?;
        temp.child("main.kicad_pro").write_str("{}")?;
        temp.child("main.kicad_sch")
            .write_str("(kicad_sch (version 20231120) (generator \"eeschema\"))")?;

        let store = MemoryBoardStore::new();
        let netlist = Rc::new(RefCell::new(NETLIST.to_string()));
        let lookups = Rc::new(RefCell::new(Vec::new()));

        let mut resolver = FootprintResolver::new(FixtureLoader {
            known: &["R_0603", "R_0402", "C_0402"],
            lookups: lookups.clone(),
        });
        resolver.set_library_paths(BTreeMap::from([
            ("R".to_string(), PathBuf::from("/lib/R.pretty")),
            ("C".to_string(), PathBuf::from("/lib/C.pretty")),
        ]));

        let manager = MultiBoardManager::builder(temp.path())
            .store(store.clone())
            .exporter(exporter(netlist.clone()))
            .checker(checker)
            .resolver(resolver)
            .build();

        let fixture = Self {
            temp,
            store,
            netlist,
            lookups,
            manager,
        };
        fixture.put("A", Vec::new());
        fixture.put("B", Vec::new());
        Ok(fixture)
    }

    pub fn pcb(&self, board: &str) -> PathBuf {
        self.manager.root().join(format!("boards/{board}/{board}.kicad_pcb"))
    }

    /// Replace a board's contents.
    pub fn put(&self, board: &str, footprints: Vec<Footprint>) {
        self.store.insert(
            self.pcb(board),
            MemoryBoard {
                footprints,
                ..Default::default()
            },
        );
    }

    /// Saved contents of a board.
    pub fn board(&self, board: &str) -> MemoryBoard {
        self.store.get(&self.pcb(board)).unwrap_or_default()
    }

    pub fn references(&self, board: &str) -> Vec<String> {
        let mut refs: Vec<String> = self
            .board(board)
            .footprints
            .iter()
            .map(Footprint::reference)
            .collect();
        refs.sort();
        refs
    }

    pub fn lookups_of(&self, name: &str) -> usize {
        self.lookups.borrow().iter().filter(|n| *n == name).count()
    }
}

/// A placed footprint with two pads.
pub fn placed(reference: &str, fpid: &str, at: (f64, f64, f64)) -> Footprint {
    let text = format!(
        r#"(footprint "{fpid}" (layer "F.Cu") (at {} {} {}) (uuid "00000000-0000-4000-8000-00000000beef")
  (property "Reference" "{reference}")
  (property "Value" "old")
  (pad "1" smd rect (at -0.5 0 {}) (size 0.6 0.6) (layers "F.Cu"))
  (pad "2" smd rect (at 0.5 0 {}) (size 0.6 0.6) (layers "F.Cu")))"#,
        at.0, at.1, at.2, at.2, at.2
    );
    Footprint::parse(&text).unwrap()
}
