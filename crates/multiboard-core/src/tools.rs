//! External tools the engine shells out to.

use anyhow::Result;
use multiboard_kicad::DrcReport;
use std::path::Path;

/// Turns a schematic into an XML netlist.
pub trait NetlistExporter {
    /// Write the netlist for `schematic` to `output`. `working_dir` is the
    /// project root, so project-relative library tables resolve.
    fn export(&self, schematic: &Path, output: &Path, working_dir: &Path) -> Result<()>;
}

/// Runs design rule checks on a board document.
pub trait DesignRuleChecker {
    fn check(&self, pcb: &Path) -> Result<DrcReport>;
}

/// `kicad-cli sch export netlist`
#[derive(Debug, Default, Clone, Copy)]
pub struct KicadNetlistExporter;

impl NetlistExporter for KicadNetlistExporter {
    fn export(&self, schematic: &Path, output: &Path, working_dir: &Path) -> Result<()> {
        multiboard_kicad::export_netlist(schematic, output, Some(working_dir))
    }
}

/// `kicad-cli pcb drc`
#[derive(Debug, Default, Clone, Copy)]
pub struct KicadDrc;

impl DesignRuleChecker for KicadDrc {
    fn check(&self, pcb: &Path) -> Result<DrcReport> {
        multiboard_kicad::run_drc_report(pcb, pcb.parent())
    }
}
