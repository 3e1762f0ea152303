//! The project manager: configuration, board list, and the caches that
//! reconciliation and status queries share.

use crate::board::{BoardStore, KicadBoardStore};
use crate::config::{Board, Port, Project};
use crate::constants::{BOARDS_DIR, CONFIG_FILE, FP_LIB_TABLE};
use crate::error::BoardError;
use crate::fs::write_atomic;
use crate::library::{FootprintResolver, read_lib_table};
use crate::links::setup_board_project;
use crate::netlist::NetlistFile;
use crate::placement::{PlacementIndex, PlacementMap};
use crate::tools::{DesignRuleChecker, KicadDrc, KicadNetlistExporter, NetlistExporter};
use anyhow::{Context, Result};
use multiboard_sexpr::kicad::{LibTableEntry, append_lib_table_entry, format_lib_table};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Walk up from `start` to the directory holding the project configuration.
/// Without one anywhere above, the nearest directory with a `.kicad_pro`
/// wins, and failing that `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    if let Some(dir) = start.ancestors().find(|dir| dir.join(CONFIG_FILE).is_file()) {
        return dir.to_path_buf();
    }
    start
        .ancestors()
        .find(|dir| first_kicad_pro(dir).is_some())
        .unwrap_or(start.as_path())
        .to_path_buf()
}

/// First `*.kicad_pro` in `dir`, by name.
fn first_kicad_pro(dir: &Path) -> Option<PathBuf> {
    let mut projects: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "kicad_pro") && path.is_file())
        .collect();
    projects.sort();
    projects.into_iter().next()
}

/// Filesystem-safe board name: anything but ASCII letters, digits, `_` and
/// `-` becomes `_`.
pub fn sanitize_board_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Placement status of the whole project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectStatus {
    /// `reference -> board`
    pub placed: BTreeMap<String, String>,
    /// Placeable schematic components on no board
    pub unplaced: BTreeSet<String>,
    /// Placeable schematic components. Without a netlist this is the number
    /// of placed components.
    pub total: usize,
}

pub struct ManagerBuilder {
    start: PathBuf,
    store: Box<dyn BoardStore>,
    exporter: Box<dyn NetlistExporter>,
    checker: Box<dyn DesignRuleChecker>,
    resolver: Option<FootprintResolver>,
}

impl ManagerBuilder {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
            store: Box::new(KicadBoardStore),
            exporter: Box::new(KicadNetlistExporter),
            checker: Box::new(KicadDrc),
            resolver: None,
        }
    }

    pub fn store(mut self, store: impl BoardStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn exporter(mut self, exporter: impl NetlistExporter + 'static) -> Self {
        self.exporter = Box::new(exporter);
        self
    }

    pub fn checker(mut self, checker: impl DesignRuleChecker + 'static) -> Self {
        self.checker = Box::new(checker);
        self
    }

    /// Use `resolver` instead of the project's KiCad library setup.
    pub fn resolver(mut self, resolver: FootprintResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> MultiBoardManager {
        let root = find_project_root(&self.start);
        let project = load_project(&root);
        let resolver = self
            .resolver
            .unwrap_or_else(|| FootprintResolver::for_project(&root));
        log::debug!(
            "Project root {} with {} boards",
            root.display(),
            project.boards.len()
        );

        MultiBoardManager {
            root,
            project,
            store: self.store,
            exporter: self.exporter,
            checker: self.checker,
            resolver,
            placement: PlacementIndex::default(),
            reconciled: false,
        }
    }
}

/// Read the configuration at `root`, then let the project's `.kicad_pro`
/// name the root schematic and board.
fn load_project(root: &Path) -> Project {
    let path = root.join(CONFIG_FILE);
    let mut project = match std::fs::read_to_string(&path) {
        Ok(text) => Project::from_json(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Project::default(),
        Err(e) => {
            log::warn!("Cannot read {}: {e}", path.display());
            Project::default()
        }
    };
    for problem in project.problems() {
        log::warn!("{problem}");
    }
    detect_root_files(root, &mut project);
    project
}

/// Point the root schematic and board at the files named after the first
/// `*.kicad_pro`, where they exist.
pub fn detect_root_files(root: &Path, project: &mut Project) {
    let Some(pro) = first_kicad_pro(root) else {
        return;
    };
    let schematic = pro.with_extension("kicad_sch");
    let pcb = pro.with_extension("kicad_pcb");
    let name = |path: &Path| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    if schematic.is_file() {
        project.root_schematic = name(schematic.as_path());
    }
    if pcb.is_file() {
        project.root_pcb = name(pcb.as_path());
    }
}

/// One multi-board project.
///
/// All state lives here: the configuration, the placement index, and the
/// footprint resolver's caches. Operations that change which board hosts
/// what invalidate the placement index before returning.
pub struct MultiBoardManager {
    pub(crate) root: PathBuf,
    pub(crate) project: Project,
    pub(crate) store: Box<dyn BoardStore>,
    pub(crate) exporter: Box<dyn NetlistExporter>,
    pub(crate) checker: Box<dyn DesignRuleChecker>,
    pub(crate) resolver: FootprintResolver,
    pub(crate) placement: PlacementIndex,
    /// Set after the first reconciliation of this session
    pub(crate) reconciled: bool,
}

impl MultiBoardManager {
    /// Open the project containing `start`, using KiCad for everything.
    pub fn open(start: impl Into<PathBuf>) -> Self {
        ManagerBuilder::new(start).build()
    }

    pub fn builder(start: impl Into<PathBuf>) -> ManagerBuilder {
        ManagerBuilder::new(start)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn board(&self, name: &str) -> Option<&Board> {
        self.project.boards.get(name)
    }

    pub fn resolver_mut(&mut self) -> &mut FootprintResolver {
        &mut self.resolver
    }

    pub fn save_config(&self) -> Result<()> {
        let json = self
            .project
            .to_json()
            .context("Failed to serialize project configuration")?;
        write_atomic(&self.config_path(), &json)
    }

    /// The placement index, rebuilt if anything invalidated it.
    pub fn placement(&mut self, force: bool) -> Arc<PlacementMap> {
        self.placement
            .scan(self.project.boards.values(), &self.root, self.store.as_ref(), force)
    }

    pub fn invalidate_placement(&mut self) {
        self.placement.invalidate();
    }

    /// Add a board with an empty layout under `boards/<name>/`.
    /// Returns the board document's project-relative path.
    pub fn create_board(&mut self, name: &str, description: &str) -> Result<String, BoardError> {
        if self.project.boards.contains_key(name) {
            return Err(BoardError::AlreadyExists(name.to_string()));
        }
        let safe = sanitize_board_name(name.trim());
        if !safe.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(BoardError::InvalidName);
        }

        let relative = format!("{BOARDS_DIR}/{safe}/{safe}.kicad_pcb");
        let pcb = self.root.join(&relative);
        if self.store.exists(&pcb) || pcb.exists() {
            return Err(BoardError::PcbExists(relative));
        }

        // No document until the board directory is set up.
        let mut board = Board::new(name, relative.clone());
        board.description = description.to_string();
        setup_board_project(&self.root, &self.project, &board)?;
        self.store.create_empty(&pcb)?;

        self.project.boards.insert(name.to_string(), board);
        self.save_config()?;
        self.placement.invalidate();

        log::info!("Created board '{name}' at {relative}");
        Ok(relative)
    }

    /// Forget a board. Its files stay on disk.
    pub fn remove_board(&mut self, name: &str) -> Result<Board, BoardError> {
        let board = self
            .project
            .boards
            .remove(name)
            .ok_or_else(|| BoardError::NotFound(name.to_string()))?;
        self.save_config()?;
        self.placement.invalidate();
        log::info!("Removed board '{name}', {} left in place", board.pcb_path);
        Ok(board)
    }

    /// Add or replace a port on a board.
    pub fn set_port(&mut self, board: &str, port: Port) -> Result<(), BoardError> {
        let entry = self
            .project
            .boards
            .get_mut(board)
            .ok_or_else(|| BoardError::NotFound(board.to_string()))?;
        let mut port = port;
        port.position = port.position.clamp(0.0, 1.0);
        entry.ports.insert(port.name.clone(), port);
        self.save_config()?;
        Ok(())
    }

    pub fn remove_port(&mut self, board: &str, name: &str) -> Result<Port, BoardError> {
        let entry = self
            .project
            .boards
            .get_mut(board)
            .ok_or_else(|| BoardError::NotFound(board.to_string()))?;
        let port = entry.ports.remove(name).ok_or_else(|| BoardError::UnknownPort {
            board: board.to_string(),
            port: name.to_string(),
        })?;
        self.save_config()?;
        Ok(port)
    }

    /// Register `nickname` in the project's `fp-lib-table` as
    /// `${KIPRJMOD}/<relative>`, unless a library of that name is already
    /// there. Returns whether the table changed.
    pub fn ensure_lib_in_table(&mut self, nickname: &str, relative: &str) -> Result<bool> {
        let path = self.root.join(FP_LIB_TABLE);
        let entry = LibTableEntry::kicad(nickname, format!("${{KIPRJMOD}}/{relative}"));

        let contents = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match append_lib_table_entry(&text, "fp_lib_table", &entry)
                .map_err(|e| anyhow::anyhow!("Invalid library table {}: {e}", path.display()))?
            {
                Some(updated) => updated,
                None => return Ok(false),
            }
        } else {
            format_lib_table("fp_lib_table", &[entry])
        };
        write_atomic(&path, &contents)?;

        let libraries = read_lib_table(&path, &self.root)?;
        self.resolver.set_library_paths(libraries);
        log::info!("Registered footprint library {nickname}");
        Ok(true)
    }

    /// Export the root schematic's netlist. `None` when no schematic is
    /// configured or the export fails.
    pub fn export_netlist(&self) -> Option<NetlistFile> {
        match self.try_export_netlist() {
            Ok(netlist) => Some(netlist),
            Err(e) => {
                log::warn!("{e:#}");
                None
            }
        }
    }

    pub(crate) fn try_export_netlist(&self) -> Result<NetlistFile> {
        if self.project.root_schematic.is_empty() {
            anyhow::bail!("No root schematic configured");
        }
        let schematic = self.root.join(&self.project.root_schematic);
        if !schematic.is_file() {
            anyhow::bail!("Root schematic not found: {}", schematic.display());
        }
        NetlistFile::export(self.exporter.as_ref(), &schematic, &self.root)
    }

    /// Which components are placed where, and which are still missing.
    pub fn status(&mut self) -> Result<ProjectStatus> {
        let placed: BTreeMap<String, String> = self
            .placement(false)
            .iter()
            .map(|(reference, at)| (reference.clone(), at.board.clone()))
            .collect();

        let Some(netlist) = self.export_netlist() else {
            let total = placed.len();
            return Ok(ProjectStatus {
                placed,
                unplaced: BTreeSet::new(),
                total,
            });
        };

        let placeable: BTreeSet<String> = netlist
            .components()?
            .into_values()
            .filter(|c| !c.skip())
            .map(|c| c.reference)
            .collect();
        let unplaced = placeable
            .iter()
            .filter(|reference| !placed.contains_key(*reference))
            .cloned()
            .collect();

        Ok(ProjectStatus {
            placed,
            unplaced,
            total: placeable.len(),
        })
    }

    /// `net -> {"REF.PAD"}` for one board. Unconnected pads are left out.
    pub fn board_nets(&self, name: &str) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let board = self
            .board(name)
            .ok_or_else(|| BoardError::NotFound(name.to_string()))?;
        let path = board.pcb_file(&self.root);
        if !self.store.exists(&path) {
            return Ok(BTreeMap::new());
        }
        let doc = self.store.open(&path)?;

        let mut nets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for footprint in doc.footprints() {
            let reference = footprint.reference();
            for (pad, net) in footprint.pads() {
                if !net.is_empty() {
                    nets.entry(net).or_default().insert(format!("{reference}.{pad}"));
                }
            }
        }
        Ok(nets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_board_name() {
        assert_eq!(sanitize_board_name("Power Supply"), "Power_Supply");
        assert_eq!(sanitize_board_name("io-v2_b"), "io-v2_b");
        assert_eq!(sanitize_board_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_board_name("Ünï"), "_n_");
    }

    #[test]
    fn test_find_project_root_prefers_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join(CONFIG_FILE), "{}").unwrap();
        std::fs::write(root.join("main.kicad_pro"), "{}").unwrap();
        let board_dir = root.join("boards/PSU");
        std::fs::create_dir_all(&board_dir).unwrap();
        std::fs::write(board_dir.join("PSU.kicad_pro"), "{}").unwrap();

        assert_eq!(find_project_root(&board_dir), root);
    }

    #[test]
    fn test_find_project_root_falls_back_to_kicad_pro() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("main.kicad_pro"), "{}").unwrap();
        let nested = root.join("docs/notes");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), root);

        let lonely = tempfile::tempdir().unwrap();
        let lonely_root = lonely.path().canonicalize().unwrap();
        assert_eq!(find_project_root(&lonely_root), lonely_root);
    }

    #[test]
    fn test_detect_root_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.kicad_pro"), "{}").unwrap();
        std::fs::write(dir.path().join("a.kicad_pro"), "{}").unwrap();
        std::fs::write(dir.path().join("a.kicad_sch"), "").unwrap();

        let mut project = Project {
            root_pcb: "old.kicad_pcb".into(),
            ..Default::default()
        };
        detect_root_files(dir.path(), &mut project);
        assert_eq!(project.root_schematic, "a.kicad_sch");
        assert_eq!(project.root_pcb, "old.kicad_pcb");
    }
}
