//! Footprint library resolution.
//!
//! A `Library:Name` footprint id is looked up in order in
//! 1. the project's `fp-lib-table`
//! 2. KiCad's stock library directory (`<share>/footprints/<Library>.pretty`)
//! 3. the user's global `fp-lib-table`, or the nickname itself when it is an
//!    absolute path
//!
//! Lookups that fail are remembered until the library table is replaced or
//! [`FootprintResolver::clear_failures`] is called, so a board with fifty
//! copies of a missing part only searches once.

use crate::constants::FP_LIB_TABLE;
use crate::footprint::{Footprint, split_fpid};
use anyhow::{Context, Result};
use multiboard_sexpr::kicad::parse_lib_table;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid variable pattern"));

/// Reads one footprint out of a library directory.
pub trait FootprintLoader {
    /// Load `name` from the `.pretty` directory `library`. Every call returns
    /// a new instance.
    fn load(&self, library: &Path, name: &str) -> Result<Footprint>;
}

/// Loads `<library>/<name>.kicad_mod` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct KicadModLoader;

impl FootprintLoader for KicadModLoader {
    fn load(&self, library: &Path, name: &str) -> Result<Footprint> {
        let file = library.join(format!("{name}.kicad_mod"));
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Footprint::from_library(&text, name)
    }
}

/// Expand `${KIPRJMOD}` and environment variables in a library URI. Returns
/// `None` when a variable cannot be resolved.
pub fn expand_uri(uri: &str, project_dir: &Path) -> Option<String> {
    let project = project_dir.to_string_lossy().replace('\\', "/");
    let mut unresolved = false;
    let expanded = ENV_VAR.replace_all(uri, |caps: &regex::Captures| {
        let var = &caps[1];
        if var == "KIPRJMOD" {
            return project.clone();
        }
        std::env::var(var).unwrap_or_else(|_| {
            unresolved = true;
            String::new()
        })
    });
    if unresolved {
        log::debug!("Cannot resolve library URI {uri}");
        return None;
    }
    Some(expanded.into_owned())
}

/// Read an `fp-lib-table` into `nickname -> directory`. Rows whose URI uses
/// unknown variables are left out.
pub fn read_lib_table(path: &Path, project_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries = parse_lib_table(&text, "fp_lib_table")
        .map_err(|e| anyhow::anyhow!("Invalid library table {}: {e}", path.display()))?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let uri = expand_uri(&entry.uri, project_dir)?;
            Some((entry.name, PathBuf::from(uri)))
        })
        .collect())
}

/// Resolves footprint ids to fresh footprint instances.
pub struct FootprintResolver {
    loader: Box<dyn FootprintLoader>,
    library_paths: BTreeMap<String, PathBuf>,
    system_dir: Option<PathBuf>,
    global_libraries: BTreeMap<String, PathBuf>,
    failed: BTreeSet<String>,
}

impl FootprintResolver {
    /// A resolver with no libraries configured.
    pub fn new(loader: impl FootprintLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            library_paths: BTreeMap::new(),
            system_dir: None,
            global_libraries: BTreeMap::new(),
            failed: BTreeSet::new(),
        }
    }

    /// The KiCad setup for `project_dir`: its `fp-lib-table`, the stock
    /// libraries and the user's global table.
    pub fn for_project(project_dir: &Path) -> Self {
        let table = |path: &Path| {
            read_lib_table(path, project_dir).unwrap_or_else(|e| {
                log::warn!("{e:#}");
                BTreeMap::new()
            })
        };

        let project_table = project_dir.join(FP_LIB_TABLE);
        let library_paths = if project_table.is_file() {
            table(&project_table)
        } else {
            BTreeMap::new()
        };
        let global_libraries = multiboard_kicad::paths::global_fp_lib_table()
            .map(|path| table(&path))
            .unwrap_or_default();
        let system_dir = multiboard_kicad::paths::system_footprint_dir();

        log::debug!(
            "Footprint libraries: {} project, {} global, stock at {:?}",
            library_paths.len(),
            global_libraries.len(),
            system_dir
        );

        let mut resolver = Self::new(KicadModLoader)
            .with_system_dir(system_dir)
            .with_global_libraries(global_libraries);
        resolver.set_library_paths(library_paths);
        resolver
    }

    pub fn with_system_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.system_dir = dir;
        self
    }

    pub fn with_global_libraries(mut self, libraries: BTreeMap<String, PathBuf>) -> Self {
        self.global_libraries = libraries;
        self
    }

    /// Replace the project library table. Clears remembered failures.
    pub fn set_library_paths(&mut self, paths: BTreeMap<String, PathBuf>) {
        self.library_paths = paths;
        self.failed.clear();
    }

    pub fn library_paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.library_paths
    }

    pub fn clear_failures(&mut self) {
        self.failed.clear();
    }

    pub fn is_known_failure(&self, nickname: &str, name: &str) -> bool {
        self.failed.contains(&failure_key(nickname, name))
    }

    /// Resolve a `Library:Name` id.
    pub fn load_fpid(&mut self, fpid: &str) -> Option<Footprint> {
        let (nickname, name) = split_fpid(fpid);
        self.load(nickname, name)
    }

    /// Resolve `nickname:name` to a new footprint instance carrying that id.
    pub fn load(&mut self, nickname: &str, name: &str) -> Option<Footprint> {
        let key = failure_key(nickname, name);
        if self.failed.contains(&key) {
            return None;
        }

        for library in self.candidates(nickname) {
            match self.loader.load(&library, name) {
                Ok(mut footprint) => {
                    footprint.set_fpid(&key);
                    return Some(footprint);
                }
                Err(e) => log::debug!("{key} not in {}: {e:#}", library.display()),
            }
        }

        log::warn!("Footprint {key} not found in any library");
        self.failed.insert(key);
        None
    }

    fn candidates(&self, nickname: &str) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if nickname.is_empty() {
            return dirs;
        }
        if let Some(dir) = self.library_paths.get(nickname) {
            dirs.push(dir.clone());
        }
        if let Some(system) = &self.system_dir {
            let dir = system.join(format!("{nickname}.pretty"));
            if dir.is_dir() {
                dirs.push(dir);
            }
        }
        if let Some(dir) = self.global_libraries.get(nickname) {
            dirs.push(dir.clone());
        } else if Path::new(nickname).is_absolute() {
            dirs.push(PathBuf::from(nickname));
        }
        dirs.dedup();
        dirs
    }
}

fn failure_key(nickname: &str, name: &str) -> String {
    format!("{nickname}:{name}")
}
