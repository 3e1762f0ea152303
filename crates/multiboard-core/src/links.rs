//! Board project directories.
//!
//! Every board directory holds the same schematic as the project root:
//! the root sheet is linked in under the board's own name, and every sub-sheet
//! under its relative path, so editing either copy edits the one file.
//! Hard links are preferred, with symbolic links as the fallback.

use crate::config::{Board, Project};
use crate::constants::{FP_LIB_TABLE, SYM_LIB_TABLE};
use crate::fs::write_atomic;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SHEET_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+\.kicad_sch)""#).expect("valid sheet pattern"));

/// Every schematic reachable from `root_schematic` through sheet references,
/// relative to the root schematic's directory. Sheets outside that directory
/// and missing files are left out. Each file is read once, so reference
/// cycles terminate.
pub fn find_sheets(root_schematic: &Path) -> BTreeSet<PathBuf> {
    let mut sheets = BTreeSet::new();
    let Ok(root) = root_schematic.canonicalize() else {
        return sheets;
    };
    let Some(base) = root.parent().map(Path::to_path_buf) else {
        return sheets;
    };

    let mut visited = BTreeSet::new();
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let content = match std::fs::read(&current) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                log::debug!("Cannot read sheet {}: {e}", current.display());
                continue;
            }
        };
        let dir = current.parent().unwrap_or(&base);
        for caps in SHEET_FILE.captures_iter(&content) {
            let Ok(sheet) = dir.join(&caps[1]).canonicalize() else {
                log::debug!("Sheet {} referenced by {} is missing", &caps[1], current.display());
                continue;
            };
            if sheet == root {
                // A sub-sheet pointing back at the top
            } else if let Ok(relative) = sheet.strip_prefix(&base) {
                sheets.insert(relative.to_path_buf());
            } else {
                log::warn!("Sheet {} is outside the project, not linking it", sheet.display());
            }
            stack.push(sheet);
        }
    }
    sheets
}

/// Make `destination` another name for `source`, replacing whatever is there.
/// Returns false when neither a hard nor a symbolic link could be made.
/// A destination that already is `source` is left alone.
pub fn link_file(source: &Path, destination: &Path) -> Result<bool> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if same_file(source, destination) {
        return Ok(true);
    }
    if destination.symlink_metadata().is_ok() {
        std::fs::remove_file(destination)
            .with_context(|| format!("Failed to replace {}", destination.display()))?;
    }

    let hard = match std::fs::hard_link(source, destination) {
        Ok(()) => return Ok(true),
        Err(e) => e,
    };
    log::debug!(
        "Hard link {} -> {} failed ({hard}), trying a symlink",
        destination.display(),
        source.display()
    );

    match symlink(source, destination) {
        Ok(()) => Ok(true),
        Err(e) => {
            log::warn!(
                "Could not link {} to {}: {e}; copy it by hand",
                destination.display(),
                source.display()
            );
            Ok(false)
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, destination)
}

#[cfg(windows)]
fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, destination)
}

/// `C:\work\proj` -> `C:/work/proj`, the way KiCad writes paths in tables.
pub fn posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Create or refresh the board's directory: a minimal `.kicad_pro`, links to
/// the project schematic and its sheets, and copies of the library tables
/// with `${KIPRJMOD}` pointing back at the project root.
pub fn setup_board_project(root: &Path, project: &Project, board: &Board) -> Result<()> {
    let pcb = board.pcb_file(root);
    let board_dir = pcb.parent().unwrap_or(root).to_path_buf();
    let stem = pcb
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| board.name.clone());

    std::fs::create_dir_all(&board_dir)
        .with_context(|| format!("Failed to create {}", board_dir.display()))?;
    // A board kept next to the project files shares its sheets and tables.
    let in_root = same_file(&board_dir, root);

    let pro = board_dir.join(format!("{stem}.kicad_pro"));
    if !pro.exists() {
        let contents = serde_json::to_string_pretty(&serde_json::json!({
            "meta": { "filename": format!("{stem}.kicad_pro") }
        }))?;
        write_atomic(&pro, &contents)?;
    }

    if !project.root_schematic.is_empty() {
        let root_sch = root.join(&project.root_schematic);
        if root_sch.is_file() {
            link_file(&root_sch, &board_dir.join(format!("{stem}.kicad_sch")))?;
            let sheet_base = root_sch.parent().unwrap_or(root);
            if !same_file(sheet_base, &board_dir) {
                for sheet in find_sheets(&root_sch) {
                    link_file(&sheet_base.join(&sheet), &board_dir.join(&sheet))?;
                }
            }
        } else {
            log::warn!("Root schematic {} not found", root_sch.display());
        }
    }

    let project_root = posix_path(root);
    for table in [FP_LIB_TABLE, SYM_LIB_TABLE] {
        let source = root.join(table);
        if in_root || !source.is_file() {
            continue;
        }
        let bytes =
            std::fs::read(&source).with_context(|| format!("Failed to read {}", source.display()))?;
        let contents = String::from_utf8_lossy(&bytes).replace("${KIPRJMOD}", &project_root);
        write_atomic(&board_dir.join(table), &contents)?;
    }

    log::debug!("Board project for '{}' ready in {}", board.name, board_dir.display());
    Ok(())
}
