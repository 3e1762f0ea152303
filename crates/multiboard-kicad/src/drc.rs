use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `[NET]` tokens in KiCad item descriptions, e.g. `Pad 2 [VBUS] of J1 on F.Cu`.
static NET_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\[]+)\]").expect("valid net token pattern"));

/// KiCad DRC report structure matching the JSON schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrcReport {
    #[serde(default)]
    pub coordinate_units: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub kicad_version: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub violations: Vec<DrcViolation>,
    /// Ratsnest lines KiCad reports separately from rule violations.
    #[serde(default)]
    pub unconnected_items: Vec<DrcViolation>,
    #[serde(default)]
    pub schematic_parity: Vec<DrcViolation>,
}

/// A single DRC violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrcViolation {
    #[serde(rename = "type")]
    pub violation_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<DrcItem>,
    /// Whether this violation has been excluded by the user in KiCad
    #[serde(default)]
    pub excluded: bool,
}

/// An item involved in a DRC violation (track, via, pad, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrcItem {
    pub description: String,
    #[serde(default)]
    pub pos: DrcPosition,
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DrcPosition {
    pub x: f64,
    pub y: f64,
}

impl DrcReport {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse DRC JSON report")
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read DRC report file")?;
        Self::from_json(&contents)
    }

    /// Rule violations followed by unconnected items, in report order.
    pub fn all_violations(&self) -> impl Iterator<Item = &DrcViolation> {
        self.violations.iter().chain(self.unconnected_items.iter())
    }

    pub fn has_violations(&self) -> bool {
        self.all_violations().any(|v| !v.excluded)
    }

    /// Count of (errors, warnings), ignoring user exclusions
    pub fn violation_counts(&self) -> (usize, usize) {
        let active = || self.all_violations().filter(|v| !v.excluded);
        let errors = active().filter(|v| v.severity == "error").count();
        let warnings = active().filter(|v| v.severity == "warning").count();
        (errors, warnings)
    }
}

impl DrcViolation {
    /// `unconnected_items` and friends: a missing copper connection.
    pub fn is_unconnected(&self) -> bool {
        self.violation_type.to_lowercase().contains("unconnected")
    }

    /// Net names mentioned in the description or any item description.
    pub fn referenced_nets(&self) -> BTreeSet<String> {
        std::iter::once(self.description.as_str())
            .chain(self.items.iter().map(|i| i.description.as_str()))
            .flat_map(|text| NET_TOKEN.captures_iter(text))
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// One-line rendering: `[type] description`
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.violation_type, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DRC_JSON: &str = r#"{
        "$schema": "https://schemas.kicad.org/drc.v1.json",
        "coordinate_units": "mm",
        "date": "2025-11-04T12:48:51-0500",
        "kicad_version": "9.0.5",
        "schematic_parity": [],
        "source": "Power.kicad_pcb",
        "unconnected_items": [
            {
                "description": "Missing connection between items",
                "items": [
                    {
                        "description": "Pad 1 [VBUS] of J1 on F.Cu",
                        "pos": { "x": 100.0, "y": 50.0 },
                        "uuid": "0b0e3a4c-1111-4a4a-9a9a-000000000001"
                    },
                    {
                        "description": "Pad 2 [VBUS] of C3 on F.Cu",
                        "pos": { "x": 104.5, "y": 51.2 },
                        "uuid": "0b0e3a4c-1111-4a4a-9a9a-000000000002"
                    }
                ],
                "severity": "error",
                "type": "unconnected_items"
            }
        ],
        "violations": [
            {
                "description": "Clearance violation (netclass 'Default' clearance 0.2000 mm; actual 0.1510 mm)",
                "items": [
                    {
                        "description": "Track [SW_NODE] on F.Cu, length 0.9239 mm",
                        "pos": { "x": 137.703288, "y": 105.755 },
                        "uuid": "73a755bc-6b87-438e-95c8-24612401333c"
                    },
                    {
                        "description": "Via [GND] on F.Cu - B.Cu",
                        "pos": { "x": 137.840388, "y": 105.325 },
                        "uuid": "cb5a5146-4eb1-449e-997e-a7851cb3090e"
                    }
                ],
                "severity": "error",
                "type": "clearance"
            },
            {
                "description": "Silkscreen overlap",
                "items": [
                    {
                        "description": "Segment of R3 on F.Silkscreen",
                        "pos": { "x": 144.603641, "y": 99.675 },
                        "uuid": "693af33e-7cbf-40a5-98d4-012b0e622558"
                    }
                ],
                "severity": "warning",
                "type": "silk_overlap",
                "excluded": true
            }
        ]
    }"#;

    #[test]
    fn test_parse_drc_json() {
        let report = DrcReport::from_json(SAMPLE_DRC_JSON).expect("Failed to parse DRC JSON");

        assert_eq!(report.kicad_version, "9.0.5");
        assert_eq!(report.source, "Power.kicad_pcb");
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.unconnected_items.len(), 1);

        let v1 = &report.violations[0];
        assert_eq!(v1.violation_type, "clearance");
        assert_eq!(v1.items.len(), 2);
        assert!(!v1.is_unconnected());

        assert!(report.violations[1].excluded);
        assert!(report.unconnected_items[0].is_unconnected());
    }

    #[test]
    fn test_violation_counts_skip_exclusions() {
        let report = DrcReport::from_json(SAMPLE_DRC_JSON).unwrap();
        assert!(report.has_violations());
        assert_eq!(report.violation_counts(), (2, 0));
        assert_eq!(report.all_violations().count(), 3);
    }

    #[test]
    fn test_referenced_nets() {
        let report = DrcReport::from_json(SAMPLE_DRC_JSON).unwrap();
        let nets: Vec<_> = report.violations[0].referenced_nets().into_iter().collect();
        assert_eq!(nets, ["GND", "SW_NODE"]);

        let unconnected = report.unconnected_items[0].referenced_nets();
        assert_eq!(unconnected.len(), 1);
        assert!(unconnected.contains("VBUS"));
    }

    #[test]
    fn test_minimal_report() {
        let report = DrcReport::from_json(r#"{"violations": []}"#).unwrap();
        assert!(!report.has_violations());
        assert!(report.unconnected_items.is_empty());
    }

    #[test]
    fn test_summary() {
        let report = DrcReport::from_json(SAMPLE_DRC_JSON).unwrap();
        assert_eq!(
            report.unconnected_items[0].summary(),
            "[unconnected_items] Missing connection between items"
        );
    }
}
