//! Persisted project description (`.kicad_multiboard.json`).
//!
//! Loading never fails. Every field has a default, wrongly typed scalars fall
//! back to their default, and a board or port entry that cannot be read at all
//! (including the legacy form where the entry is a bare string) becomes a
//! default record named after its map key.

use crate::constants::{
    CONFIG_VERSION, DEFAULT_BLOCK_HEIGHT, DEFAULT_BLOCK_WIDTH, DEFAULT_PORT_POSITION,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Board edge a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    Left,
    #[default]
    Right,
    Top,
    Bottom,
}

impl PortSide {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for PortSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        })
    }
}

impl<'de> Deserialize<'de> for PortSide {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_str().and_then(PortSide::parse) {
            Some(side) => side,
            None => {
                log::warn!("Unknown port side {value}, using 'right'");
                PortSide::default()
            }
        })
    }
}

/// Inter-board connection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,

    /// Net carried by the port. Empty means "same as the port name".
    #[serde(deserialize_with = "lenient::string")]
    pub net: String,

    pub side: PortSide,

    /// Position along the edge, 0.0 to 1.0
    #[serde(deserialize_with = "lenient::position")]
    pub position: f64,
}

impl Default for Port {
    fn default() -> Self {
        Self {
            name: String::new(),
            net: String::new(),
            side: PortSide::default(),
            position: DEFAULT_PORT_POSITION,
        }
    }
}

impl Port {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The net this port carries.
    pub fn effective_net(&self) -> &str {
        if self.net.is_empty() {
            &self.name
        } else {
            &self.net
        }
    }
}

/// One sub-board and its layout document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Board {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,

    /// Board document path, relative to the project root
    #[serde(deserialize_with = "lenient::string")]
    pub pcb_path: String,

    #[serde(deserialize_with = "lenient::string")]
    pub description: String,

    #[serde(deserialize_with = "lenient::block_width")]
    pub block_width: f64,

    #[serde(deserialize_with = "lenient::block_height")]
    pub block_height: f64,

    #[serde(deserialize_with = "ports_map")]
    pub ports: BTreeMap<String, Port>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            name: String::new(),
            pcb_path: String::new(),
            description: String::new(),
            block_width: DEFAULT_BLOCK_WIDTH,
            block_height: DEFAULT_BLOCK_HEIGHT,
            ports: BTreeMap::new(),
        }
    }
}

impl Board {
    pub fn new(name: impl Into<String>, pcb_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pcb_path: pcb_path.into(),
            ..Default::default()
        }
    }

    /// Absolute location of the board document.
    pub fn pcb_file(&self, root: &Path) -> PathBuf {
        root.join(&self.pcb_path)
    }

    /// Effective nets of every declared port.
    pub fn port_nets(&self) -> BTreeSet<String> {
        self.ports
            .values()
            .map(|p| p.effective_net().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Top-level project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "lenient::version")]
    pub version: String,

    /// Root schematic file name, relative to the project root
    #[serde(deserialize_with = "lenient::string")]
    pub root_schematic: String,

    /// Optional root board file name
    #[serde(deserialize_with = "lenient::string")]
    pub root_pcb: String,

    #[serde(deserialize_with = "boards_map")]
    pub boards: BTreeMap<String, Board>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            root_schematic: String::new(),
            root_pcb: String::new(),
            boards: BTreeMap::new(),
        }
    }
}

impl Project {
    /// Read a configuration document. Unreadable JSON yields the defaults.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                log::warn!("Ignoring unreadable project configuration: {e}");
                Self::default()
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            log::warn!("Project configuration is not a JSON object, using defaults");
            return Self::default();
        }
        // Every field is lenient, so this only fails on truly exotic input.
        serde_json::from_value(value).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed project configuration: {e}");
            Self::default()
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Consistency problems that loading tolerates but callers may want to
    /// surface: shared board documents and paths escaping the project root.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, board) in &self.boards {
            if board.pcb_path.is_empty() {
                problems.push(format!("Board '{name}' has no PCB path"));
                continue;
            }
            if !stays_under_root(Path::new(&board.pcb_path)) {
                problems.push(format!(
                    "Board '{name}' PCB path '{}' is outside the project",
                    board.pcb_path
                ));
            }
            if let Some(other) = seen.insert(&board.pcb_path, name) {
                problems.push(format!(
                    "Boards '{other}' and '{name}' share PCB '{}'",
                    board.pcb_path
                ));
            }
        }
        problems
    }
}

/// Relative, and never climbs above its starting directory.
fn stays_under_root(path: &Path) -> bool {
    let mut depth = 0i32;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn ports_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Port>, D::Error> {
    Ok(records(
        Value::deserialize(d)?,
        "port",
        |name, mut port: Port| {
            if port.name.is_empty() {
                port.name = name.to_string();
            }
            port
        },
        |name| Port::named(name),
    ))
}

fn boards_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Board>, D::Error> {
    Ok(records(
        Value::deserialize(d)?,
        "board",
        |name, mut board: Board| {
            if board.name.is_empty() {
                board.name = name.to_string();
            }
            board
        },
        |name| Board::new(name, ""),
    ))
}

/// Read a `name -> record` object entry by entry.
fn records<T: serde::de::DeserializeOwned>(
    value: Value,
    what: &str,
    fixup: impl Fn(&str, T) -> T,
    fallback: impl Fn(&str) -> T,
) -> BTreeMap<String, T> {
    let Value::Object(entries) = value else {
        if !value.is_null() {
            log::warn!("Expected a map of {what}s, got {value}");
        }
        return BTreeMap::new();
    };

    entries
        .into_iter()
        .map(|(name, entry)| {
            let record = match entry {
                Value::Object(_) => match serde_json::from_value::<T>(entry) {
                    Ok(record) => fixup(&name, record),
                    Err(e) => {
                        log::warn!("Resetting malformed {what} '{name}': {e}");
                        fallback(&name)
                    }
                },
                legacy => {
                    log::debug!("Upgrading legacy {what} entry '{name}': {legacy}");
                    fallback(&name)
                }
            };
            (name, record)
        })
        .collect()
}

/// Field readers that substitute the default for a wrongly typed value.
mod lenient {
    use super::*;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn version<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let version = string(d)?;
        Ok(if version.is_empty() {
            CONFIG_VERSION.to_string()
        } else {
            version
        })
    }

    fn number(value: Value, default: f64) -> f64 {
        match value {
            Value::Number(n) => n.as_f64().unwrap_or(default),
            Value::String(s) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn position<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(Value::deserialize(d)?, DEFAULT_PORT_POSITION).clamp(0.0, 1.0))
    }

    pub fn block_width<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(Value::deserialize(d)?, DEFAULT_BLOCK_WIDTH))
    }

    pub fn block_height<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(Value::deserialize(d)?, DEFAULT_BLOCK_HEIGHT))
    }
}
