//! KiCad library tables (`fp-lib-table`, `sym-lib-table`).
//!
//! ```text
//! (fp_lib_table
//!   (version 7)
//!   (lib (name "Resistor_SMD")(type "KiCad")(uri "${KIPRJMOD}/libs/R.pretty")(options "")(descr ""))
//! )
//! ```

use crate::{Sexpr, formatter, parse};

/// One `(lib ...)` row of a library table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibTableEntry {
    pub name: String,
    pub lib_type: String,
    pub uri: String,
    pub options: String,
    pub descr: String,
}

impl LibTableEntry {
    /// A `KiCad`-type row with empty options and description.
    pub fn kicad(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lib_type: "KiCad".to_string(),
            uri: uri.into(),
            options: String::new(),
            descr: String::new(),
        }
    }

    pub fn to_sexpr(&self) -> Sexpr {
        let field = |tag: &str, value: &str| {
            Sexpr::list(vec![Sexpr::symbol(tag), Sexpr::string(value)])
        };
        Sexpr::list(vec![
            Sexpr::symbol("lib"),
            field("name", &self.name),
            field("type", &self.lib_type),
            field("uri", &self.uri),
            field("options", &self.options),
            field("descr", &self.descr),
        ])
    }
}

/// Parse a library table. `table_tag` is `fp_lib_table` or `sym_lib_table`.
///
/// Rows missing a name or uri are skipped.
pub fn parse_lib_table(content: &str, table_tag: &str) -> Result<Vec<LibTableEntry>, String> {
    let root = parse(content).map_err(|e| e.to_string())?;
    let items = root
        .as_list()
        .ok_or_else(|| "Library table root is not a list".to_string())?;

    if items.first().and_then(Sexpr::as_sym) != Some(table_tag) {
        return Err(format!(
            "Expected '{}' root, got {:?}",
            table_tag,
            items.first().and_then(Sexpr::as_sym)
        ));
    }

    let mut entries = Vec::new();
    for node in &items[1..] {
        let Some(row) = node.as_list() else {
            continue;
        };
        if row.first().and_then(Sexpr::as_sym) != Some("lib") {
            continue;
        }
        let field = |tag: &str| super::string_prop(row, tag).unwrap_or_default();
        let (name, uri) = (field("name"), field("uri"));
        if name.is_empty() || uri.is_empty() {
            log::debug!("Skipping incomplete library table row: {node}");
            continue;
        }
        entries.push(LibTableEntry {
            name,
            lib_type: field("type"),
            uri,
            options: field("options"),
            descr: field("descr"),
        });
    }
    Ok(entries)
}

/// Add `entry` to an existing table unless a row with the same name is
/// already there. Rows and options this module does not model are kept.
/// Returns `None` when nothing had to change.
pub fn append_lib_table_entry(
    content: &str,
    table_tag: &str,
    entry: &LibTableEntry,
) -> Result<Option<String>, String> {
    if parse_lib_table(content, table_tag)?
        .iter()
        .any(|existing| existing.name == entry.name)
    {
        return Ok(None);
    }
    let mut root = parse(content).map_err(|e| e.to_string())?;
    let items = root
        .as_list_mut()
        .ok_or_else(|| "Library table root is not a list".to_string())?;
    items.push(entry.to_sexpr());
    Ok(Some(formatter::format_tree(&root)))
}

/// Render a complete library table.
pub fn format_lib_table(table_tag: &str, entries: &[LibTableEntry]) -> String {
    let mut items = vec![
        Sexpr::symbol(table_tag),
        Sexpr::list(vec![Sexpr::symbol("version"), Sexpr::int(7)]),
    ];
    items.extend(entries.iter().map(LibTableEntry::to_sexpr));
    formatter::format_tree(&Sexpr::list(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"(fp_lib_table
  (version 7)
  (lib (name "project_footprints")(type "KiCad")(uri "${KIPRJMOD}/fp/project_footprints.pretty")(options "")(descr ""))
  (lib (name "Broken")(type "KiCad"))
  (lib (name Legacy)(type KiCad)(uri /opt/libs/Legacy.pretty)(options "")(descr "old style"))
)"#;

    #[test]
    fn test_parse_lib_table() {
        let entries = parse_lib_table(TABLE, "fp_lib_table").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "project_footprints");
        assert_eq!(entries[0].uri, "${KIPRJMOD}/fp/project_footprints.pretty");
        assert_eq!(entries[1].name, "Legacy");
        assert_eq!(entries[1].uri, "/opt/libs/Legacy.pretty");
        assert_eq!(entries[1].descr, "old style");
    }

    #[test]
    fn test_wrong_table_kind() {
        let err = parse_lib_table(TABLE, "sym_lib_table").unwrap_err();
        assert!(err.contains("sym_lib_table"));
    }

    #[test]
    fn test_format_roundtrip() {
        let entries = vec![LibTableEntry::kicad("Blocks", "${KIPRJMOD}/Blocks.pretty")];
        let text = format_lib_table("fp_lib_table", &entries);
        assert_eq!(parse_lib_table(&text, "fp_lib_table").unwrap(), entries);
    }

    #[test]
    fn test_append_keeps_unknown_rows() {
        let with_disabled = TABLE.replace("(descr \"old style\")", "(descr \"old style\")(disabled)");
        let entry = LibTableEntry::kicad("Blocks", "${KIPRJMOD}/Blocks.pretty");

        let text = append_lib_table_entry(&with_disabled, "fp_lib_table", &entry)
            .unwrap()
            .unwrap();
        assert!(text.contains("(disabled)"));
        assert!(text.contains("(name \"Broken\")"));
        let names: Vec<_> = parse_lib_table(&text, "fp_lib_table")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["project_footprints", "Legacy", "Blocks"]);

        assert_eq!(append_lib_table_entry(&text, "fp_lib_table", &entry).unwrap(), None);
    }
}
