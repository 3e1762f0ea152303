//! KiCad XML netlist ingestion.
//!
//! Both readers stream the document with `quick-xml`. A document that turns
//! out to be malformed part way through is not an error: everything read up
//! to that point is returned, and a component that was being read when the
//! parser gave up is marked as skipped.

use crate::constants::TEMP_NETLIST_PREFIX;
use crate::tools::NetlistExporter;
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Why a component must not be on any board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Dnp,
    ExcludedFromBoard,
    NoFootprint,
    /// The netlist broke off while this component was being read.
    Malformed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dnp => "do not place",
            Self::ExcludedFromBoard => "excluded from board",
            Self::NoFootprint => "no footprint",
            Self::Malformed => "malformed netlist entry",
        })
    }
}

/// One schematic component, as the netlist describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub reference: String,
    /// `Library:Name`
    pub footprint_id: String,
    pub value: String,
    /// Schematic symbol UUID, used as the footprint's identity stamp
    pub path_id: String,
    pub skip_reason: Option<SkipReason>,
}

impl ComponentRecord {
    pub fn skip(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// A net and its `(reference, pin)` nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetRecord {
    pub name: String,
    pub nodes: Vec<(String, String)>,
}

/// An exported netlist on disk. A netlist exported into a scratch file
/// deletes it when dropped.
#[derive(Debug)]
pub struct NetlistFile {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl NetlistFile {
    /// Use an existing netlist file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _temp: None,
        }
    }

    /// Export `schematic` into a scratch file inside `project_dir`.
    pub fn export(
        exporter: &dyn NetlistExporter,
        schematic: &Path,
        project_dir: &Path,
    ) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_NETLIST_PREFIX)
            .suffix(".xml")
            .tempfile_in(project_dir)
            .with_context(|| format!("Failed to create netlist in {}", project_dir.display()))?;
        exporter
            .export(schematic, temp.path(), project_dir)
            .with_context(|| format!("Failed to export netlist from {}", schematic.display()))?;
        Ok(Self {
            path: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn components(&self) -> Result<BTreeMap<String, ComponentRecord>> {
        Ok(parse_components(self.open()?))
    }

    pub fn nets(&self) -> Result<Vec<NetRecord>> {
        Ok(parse_nets(self.open()?))
    }

    fn open(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open netlist {}", self.path.display()))?;
        Ok(BufReader::new(file))
    }
}

/// Lower-case, with spaces and hyphens turned into underscores.
fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Match a property against the skip rules. An empty value counts as set.
fn property_skip(name: &str, value: &str) -> Option<SkipReason> {
    let name = normalize_name(name);
    let value = value.trim().to_lowercase();
    if name == "dnp" && matches!(value.as_str(), "" | "yes" | "true" | "1" | "dnp") {
        return Some(SkipReason::Dnp);
    }
    if name.contains("exclude")
        && name.contains("board")
        && matches!(value.as_str(), "" | "yes" | "true" | "1")
    {
        return Some(SkipReason::ExcludedFromBoard);
    }
    None
}

#[derive(Default)]
struct ComponentBuilder {
    reference: String,
    footprint: String,
    value: String,
    path_id: String,
    /// `<property>` attributes and legacy `<field>` entries alike
    properties: Vec<(String, String)>,
}

impl ComponentBuilder {
    fn finish(self, malformed: bool) -> Option<ComponentRecord> {
        let reference = self.reference.trim().to_string();
        if reference.is_empty() || reference.starts_with('#') {
            return None;
        }
        let footprint_id = self.footprint.trim().to_string();
        let value = self.value.trim().to_string();

        let skip_reason = if malformed {
            Some(SkipReason::Malformed)
        } else {
            self.properties
                .iter()
                .find_map(|(name, value)| property_skip(name, value))
                .or_else(|| value.eq_ignore_ascii_case("dnp").then_some(SkipReason::Dnp))
                .or_else(|| footprint_id.is_empty().then_some(SkipReason::NoFootprint))
        };

        Some(ComponentRecord {
            reference,
            footprint_id,
            value,
            path_id: self.path_id.trim().to_string(),
            skip_reason,
        })
    }
}

/// Which text-bearing element we are inside of.
#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    None,
    Value,
    Footprint,
    Tstamp,
    Tstamps,
    Field,
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Read the `<components>` section into `reference -> record`. Components
/// without a reference, and power symbols (`#PWR01`), are dropped.
pub fn parse_components(input: impl BufRead) -> BTreeMap<String, ComponentRecord> {
    // Text is trimmed once per field, after entities are joined back in.
    let mut reader = Reader::from_reader(input);

    let mut components = BTreeMap::new();
    let mut current: Option<ComponentBuilder> = None;
    let mut target = TextTarget::None;
    let mut text = String::new();
    let mut field_name = String::new();
    let mut buf = Vec::new();

    let mut keep = |builder: ComponentBuilder, malformed: bool| {
        if let Some(record) = builder.finish(malformed) {
            if let Some(skip) = record.skip_reason {
                log::debug!("{} skipped: {skip}", record.reference);
            }
            components.insert(record.reference.clone(), record);
        }
    };

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                log::warn!(
                    "Netlist parse error at byte {}: {e}",
                    reader.buffer_position()
                );
                if let Some(builder) = current.take() {
                    keep(builder, true);
                }
                break;
            }
        };

        match event {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"comp" => {
                    current = Some(ComponentBuilder {
                        reference: attribute(&e, b"ref").unwrap_or_default(),
                        ..Default::default()
                    });
                }
                name if current.is_some() => {
                    target = match name {
                        b"value" => TextTarget::Value,
                        b"footprint" => TextTarget::Footprint,
                        b"tstamp" => TextTarget::Tstamp,
                        b"tstamps" => TextTarget::Tstamps,
                        b"field" => {
                            field_name = attribute(&e, b"name").unwrap_or_default();
                            TextTarget::Field
                        }
                        b"property" => {
                            record_property(current.as_mut(), &e);
                            TextTarget::None
                        }
                        _ => TextTarget::None,
                    };
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"comp" => {
                    let builder = ComponentBuilder {
                        reference: attribute(&e, b"ref").unwrap_or_default(),
                        ..Default::default()
                    };
                    keep(builder, false);
                }
                b"property" => record_property(current.as_mut(), &e),
                b"field" => {
                    if let Some(builder) = current.as_mut() {
                        let name = attribute(&e, b"name").unwrap_or_default();
                        builder.properties.push((name, String::new()));
                    }
                }
                _ => {}
            },
            Event::Text(t) if target != TextTarget::None => {
                let raw = String::from_utf8_lossy(&t);
                match quick_xml::escape::unescape(&raw) {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&raw),
                }
            }
            Event::GeneralRef(r) if target != TextTarget::None => {
                let entity = format!("&{};", String::from_utf8_lossy(&r));
                match quick_xml::escape::unescape(&entity) {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&entity),
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"comp" => {
                    if let Some(builder) = current.take() {
                        keep(builder, false);
                    }
                    target = TextTarget::None;
                }
                _ if target != TextTarget::None => {
                    if let Some(builder) = current.as_mut() {
                        let value = std::mem::take(&mut text);
                        match target {
                            TextTarget::Value => builder.value = value,
                            TextTarget::Footprint => builder.footprint = value,
                            TextTarget::Tstamp => builder.path_id = value,
                            // One UUID per unit; every unit stamps the same footprint.
                            TextTarget::Tstamps if builder.path_id.is_empty() => {
                                builder.path_id =
                                    value.split_whitespace().next().unwrap_or("").to_string();
                            }
                            TextTarget::Field => builder
                                .properties
                                .push((std::mem::take(&mut field_name), value)),
                            _ => {}
                        }
                    }
                    target = TextTarget::None;
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    components
}

fn record_property(builder: Option<&mut ComponentBuilder>, e: &BytesStart) {
    if let Some(builder) = builder {
        let name = attribute(e, b"name").unwrap_or_default();
        let value = attribute(e, b"value").unwrap_or_default();
        builder.properties.push((name, value));
    }
}

/// Read the `<nets>` section. Nodes without a reference or pin are dropped.
pub fn parse_nets(input: impl BufRead) -> Vec<NetRecord> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut nets = Vec::new();
    let mut current: Option<NetRecord> = None;
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                log::warn!(
                    "Netlist parse error at byte {}: {e}",
                    reader.buffer_position()
                );
                nets.extend(current.take());
                break;
            }
        };

        match event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"net" => {
                current = Some(NetRecord {
                    name: attribute(&e, b"name").unwrap_or_default(),
                    nodes: Vec::new(),
                });
            }
            Event::Empty(e) if e.name().as_ref() == b"net" => {
                nets.push(NetRecord {
                    name: attribute(&e, b"name").unwrap_or_default(),
                    nodes: Vec::new(),
                });
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"node" => {
                if let Some(net) = current.as_mut() {
                    let reference = attribute(&e, b"ref").unwrap_or_default();
                    let pin = attribute(&e, b"pin").unwrap_or_default();
                    if !reference.is_empty() && !pin.is_empty() {
                        net.nodes.push((reference, pin));
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"net" => {
                nets.extend(current.take());
            }
            _ => {}
        }
        buf.clear();
    }

    nets.retain(|net| !net.name.is_empty());
    nets
}
