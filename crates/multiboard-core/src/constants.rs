//! Fixed names and numbers shared across the crate.

/// Directory (relative to the project root) holding one folder per board.
pub const BOARDS_DIR: &str = "boards";

/// Project configuration file at the project root.
pub const CONFIG_FILE: &str = ".kicad_multiboard.json";

/// Written into new configuration files.
pub const CONFIG_VERSION: &str = "12.0";

pub const DEFAULT_BLOCK_WIDTH: f64 = 50.0;
pub const DEFAULT_BLOCK_HEIGHT: f64 = 35.0;
pub const DEFAULT_PORT_POSITION: f64 = 0.5;

/// Prefix of the scratch netlist exported next to the root schematic.
pub const TEMP_NETLIST_PREFIX: &str = ".multiboard_netlist";

/// References with this prefix belong to generated helper footprints and are
/// never treated as schematic components.
pub const INTERNAL_REF_PREFIX: &str = "MB_";

/// Pitch of the grid new footprints are dropped onto, in mm.
pub const PACK_GRID_SPACING: f64 = 10.0;
pub const PACK_MAX_PER_ROW: usize = 10;
/// Top-left cell of the placement grid, in mm.
pub const PACK_ORIGIN: (f64, f64) = (25.0, 25.0);

/// Number of failed footprints listed in an update summary.
pub const MAX_REPORTED_FAILURES: usize = 10;
/// Number of violations kept per board in a connectivity report.
pub const MAX_REPORTED_VIOLATIONS: usize = 20;

pub const FP_LIB_TABLE: &str = "fp-lib-table";
pub const SYM_LIB_TABLE: &str = "sym-lib-table";
