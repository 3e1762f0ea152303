//! Footprint instances, backed directly by their S-expression.
//!
//! Keeping the raw node means everything this crate does not understand
//! (graphics, 3D models, zones, custom attributes) passes through a
//! read/modify/write cycle untouched.

use crate::board::Net;
use anyhow::{Context, Result, bail};
use multiboard_sexpr::kicad::{
    child_list, number_list, property_value, set_child, set_property, string_prop,
};
use multiboard_sexpr::{Sexpr, kv, parse};

/// Split `Library:Name` into its parts. Without a colon the library is empty.
pub fn split_fpid(fpid: &str) -> (&str, &str) {
    fpid.split_once(':').unwrap_or(("", fpid))
}

/// Normalize an angle into KiCad's (-180, 180] range.
pub fn normalize_angle(degrees: f64) -> f64 {
    let mut angle = degrees % 360.0;
    if angle <= -180.0 {
        angle += 360.0;
    } else if angle > 180.0 {
        angle -= 360.0;
    }
    angle
}

/// A footprint on a board (or freshly read from a library).
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    items: Vec<Sexpr>,
}

impl Footprint {
    /// Wrap a `(footprint ...)` node. Legacy `(module ...)` nodes are accepted
    /// and renamed.
    pub fn from_sexpr(node: Sexpr) -> Result<Self> {
        let Some(mut items) = node.as_list().map(|l| l.to_vec()) else {
            bail!("Footprint node is not a list");
        };
        match items.first().and_then(Sexpr::as_sym) {
            Some("footprint") => {}
            Some("module") => items[0] = Sexpr::symbol("footprint"),
            other => bail!("Expected a footprint node, found {other:?}"),
        }
        if items.get(1).and_then(Sexpr::as_atom).is_none() {
            items.insert(1, Sexpr::string(""));
        }
        Ok(Self { items })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let node = parse(text).context("Failed to parse footprint")?;
        Self::from_sexpr(node)
    }

    /// Instantiate a library footprint (`.kicad_mod` contents) as board item
    /// `fpid`, unplaced at the origin with a fresh UUID.
    pub fn from_library(text: &str, fpid: &str) -> Result<Self> {
        let mut fp = Self::parse(text).with_context(|| format!("Invalid footprint {fpid}"))?;
        fp.items
            .retain(|n| !matches!(n.tag(), Some("version" | "generator" | "generator_version")));
        fp.set_fpid(fpid);
        if fp.layer().is_empty() {
            fp.set_layer("F.Cu");
        }
        if child_list(&fp.items, "at").is_none() {
            fp.set_position(0.0, 0.0);
        }
        fp.set_uuid(&uuid::Uuid::new_v4().to_string());
        Ok(fp)
    }

    pub fn to_sexpr(&self) -> Sexpr {
        Sexpr::list(self.items.clone())
    }

    pub fn into_sexpr(self) -> Sexpr {
        Sexpr::list(self.items)
    }

    pub fn fpid(&self) -> &str {
        self.items.get(1).and_then(Sexpr::as_atom).unwrap_or_default()
    }

    pub fn set_fpid(&mut self, fpid: &str) {
        self.items[1] = Sexpr::string(fpid);
    }

    pub fn reference(&self) -> String {
        self.text_field("Reference", "reference")
    }

    pub fn set_reference(&mut self, reference: &str) {
        self.set_text_field("Reference", "reference", reference);
    }

    pub fn value(&self) -> String {
        self.text_field("Value", "value")
    }

    pub fn set_value(&mut self, value: &str) {
        self.set_text_field("Value", "value", value);
    }

    /// `(property "Reference" ...)` on KiCad 8+, `(fp_text reference ...)` before.
    fn text_field(&self, property: &str, legacy: &str) -> String {
        property_value(&self.items, property)
            .or_else(|| {
                self.legacy_text(legacy)
                    .and_then(|idx| self.items[idx].as_list()?.get(2)?.as_atom())
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }

    fn set_text_field(&mut self, property: &str, legacy: &str, text: &str) {
        if property_value(&self.items, property).is_none() {
            if let Some(idx) = self.legacy_text(legacy) {
                if let Some(list) = self.items[idx].as_list_mut() {
                    if list.len() > 2 {
                        list[2] = Sexpr::string(text);
                        return;
                    }
                }
            }
        }
        set_property(&mut self.items, property, text);
    }

    fn legacy_text(&self, kind: &str) -> Option<usize> {
        self.items.iter().position(|n| {
            n.tag() == Some("fp_text")
                && n.as_list().and_then(|l| l.get(1)?.as_sym()) == Some(kind)
        })
    }

    pub fn layer(&self) -> String {
        string_prop(&self.items, "layer").unwrap_or_default()
    }

    pub fn set_layer(&mut self, layer: &str) {
        set_child(&mut self.items, kv("layer", Sexpr::string(layer)));
    }

    pub fn position(&self) -> (f64, f64) {
        let at = number_list(&self.items, "at").unwrap_or_default();
        (
            at.first().copied().unwrap_or(0.0),
            at.get(1).copied().unwrap_or(0.0),
        )
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        let rotation = self.rotation();
        self.write_at(x, y, rotation);
    }

    /// Orientation in degrees.
    pub fn rotation(&self) -> f64 {
        number_list(&self.items, "at")
            .and_then(|at| at.get(2).copied())
            .unwrap_or(0.0)
    }

    /// Set the orientation. Pad and text angles are stored absolute in board
    /// files, so they turn by the same amount.
    pub fn set_rotation(&mut self, degrees: f64) {
        let delta = normalize_angle(degrees - self.rotation());
        let (x, y) = self.position();
        self.write_at(x, y, normalize_angle(degrees));
        if delta == 0.0 {
            return;
        }
        for child in self.items.iter_mut() {
            if !matches!(child.tag(), Some("pad" | "property" | "fp_text")) {
                continue;
            }
            if let Some(list) = child.as_list_mut() {
                rotate_at(list, delta);
            }
        }
    }

    fn write_at(&mut self, x: f64, y: f64, rotation: f64) {
        let mut at = vec![Sexpr::symbol("at"), Sexpr::number(x), Sexpr::number(y)];
        if rotation != 0.0 {
            at.push(Sexpr::number(rotation));
        }
        let at = Sexpr::list(at);
        if let Some(idx) = self.items.iter().position(|n| n.tag() == Some("at")) {
            self.items[idx] = at;
            return;
        }
        // KiCad writes `at` right after `layer`.
        let idx = self
            .items
            .iter()
            .position(|n| n.tag() == Some("layer"))
            .map(|i| i + 1)
            .unwrap_or(self.items.len().min(2));
        self.items.insert(idx, at);
    }

    /// Schematic identity stamp (`(path "/<uuid>")`).
    pub fn path(&self) -> String {
        string_prop(&self.items, "path").unwrap_or_default()
    }

    /// Link this footprint to schematic symbol `path_id`. Empty ids are ignored.
    pub fn set_path(&mut self, path_id: &str) {
        if path_id.is_empty() {
            return;
        }
        let path = if path_id.starts_with('/') {
            path_id.to_string()
        } else {
            format!("/{path_id}")
        };
        set_child(&mut self.items, kv("path", Sexpr::string(path)));
    }

    pub fn uuid(&self) -> String {
        string_prop(&self.items, "uuid")
            .or_else(|| string_prop(&self.items, "tstamp"))
            .unwrap_or_default()
    }

    pub fn set_uuid(&mut self, uuid: &str) {
        set_child(&mut self.items, kv("uuid", Sexpr::string(uuid)));
    }

    /// `(number, net name)` for every pad. Unconnected pads report an empty
    /// net name.
    pub fn pads(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .filter(|n| n.tag() == Some("pad"))
            .filter_map(Sexpr::as_list)
            .map(|pad| {
                let number = pad.get(1).and_then(Sexpr::as_atom).unwrap_or_default();
                let net = child_list(pad, "net").and_then(net_name).unwrap_or_default();
                (number.to_string(), net.to_string())
            })
            .collect()
    }

    pub fn has_pad(&self, number: &str) -> bool {
        self.pads().iter().any(|(n, _)| n == number)
    }

    /// Connect every pad numbered `number` to `net`. Returns how many pads
    /// were found.
    pub fn set_pad_net(&mut self, number: &str, net: &Net) -> usize {
        let mut found = 0;
        for child in self.items.iter_mut() {
            if child.tag() != Some("pad") {
                continue;
            }
            let Some(pad) = child.as_list_mut() else {
                continue;
            };
            if pad.get(1).and_then(Sexpr::as_atom) != Some(number) {
                continue;
            }
            set_child(pad, net.to_sexpr());
            found += 1;
        }
        found
    }
}

/// `(net 3 "GND")`, or `(net "GND")` without a code.
fn net_name(net: &[Sexpr]) -> Option<&str> {
    match net.len() {
        2 => net[1].as_str(),
        _ => net.get(2)?.as_atom(),
    }
}

fn rotate_at(list: &mut [Sexpr], delta: f64) {
    let Some(at) = list
        .iter_mut()
        .find(|n| n.tag() == Some("at"))
        .and_then(Sexpr::as_list_mut)
    else {
        return;
    };
    let angle = at.get(3).and_then(Sexpr::as_f64).unwrap_or(0.0);
    let rotated = Sexpr::number(normalize_angle(angle + delta));
    match at.get(3).map(|n| n.as_f64().is_some()) {
        Some(true) => at[3] = rotated,
        // `(at x y unlocked)` and friends: the angle goes before the flag
        Some(false) => at.insert(3, rotated),
        None if at.len() == 3 => at.push(rotated),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R0402: &str = r#"(footprint "R_0402_1005Metric"
        (version 20240108)
        (generator "pcbnew")
        (layer "F.Cu")
        (descr "Resistor SMD 0402")
        (property "Reference" "REF**" (at 0 -1.17 0) (layer "F.SilkS"))
        (property "Value" "R_0402_1005Metric" (at 0 1.17 0) (layer "F.Fab"))
        (pad "1" smd roundrect (at -0.51 0) (size 0.54 0.64) (layers "F.Cu" "F.Mask" "F.Paste"))
        (pad "2" smd roundrect (at 0.51 0) (size 0.54 0.64) (layers "F.Cu" "F.Mask" "F.Paste"))
    )"#;

    #[test]
    fn test_split_fpid() {
        assert_eq!(split_fpid("Resistor_SMD:R_0402"), ("Resistor_SMD", "R_0402"));
        assert_eq!(split_fpid("a:b:c"), ("a", "b:c"));
        assert_eq!(split_fpid("R_0402"), ("", "R_0402"));
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(270.0), -90.0);
        assert_eq!(normalize_angle(-180.0), 180.0);
        assert_eq!(normalize_angle(540.0), 180.0);
        assert_eq!(normalize_angle(45.0), 45.0);
    }

    #[test]
    fn test_from_library() {
        let fp = Footprint::from_library(R0402, "Resistor_SMD:R_0402_1005Metric").unwrap();
        assert_eq!(fp.fpid(), "Resistor_SMD:R_0402_1005Metric");
        assert_eq!(fp.layer(), "F.Cu");
        assert_eq!(fp.position(), (0.0, 0.0));
        assert_eq!(fp.reference(), "REF**");
        assert!(!fp.uuid().is_empty());
        let text = fp.to_sexpr().to_string();
        assert!(!text.contains("(version"));
        assert!(!text.contains("(generator"));
    }

    #[test]
    fn test_fields_and_transform() {
        let mut fp = Footprint::from_library(R0402, "Resistor_SMD:R_0402_1005Metric").unwrap();
        fp.set_reference("R7");
        fp.set_value("10k");
        fp.set_position(10.0, 20.0);
        fp.set_rotation(90.0);
        fp.set_layer("B.Cu");
        fp.set_path("6f1c3f0e-8b7a-4bb5-9a55-0d1c7c0f6a11");

        assert_eq!(fp.reference(), "R7");
        assert_eq!(fp.value(), "10k");
        assert_eq!(fp.position(), (10.0, 20.0));
        assert_eq!(fp.rotation(), 90.0);
        assert_eq!(fp.layer(), "B.Cu");
        assert_eq!(fp.path(), "/6f1c3f0e-8b7a-4bb5-9a55-0d1c7c0f6a11");

        // Survives a text round trip
        let reparsed = Footprint::parse(&fp.to_sexpr().to_string()).unwrap();
        assert_eq!(reparsed, fp);
    }

    #[test]
    fn test_rotation_turns_pads() {
        let mut fp = Footprint::from_library(R0402, "Resistor_SMD:R_0402_1005Metric").unwrap();
        fp.set_rotation(90.0);
        fp.set_rotation(180.0);
        let text = fp.to_sexpr().to_string();
        assert!(text.contains("(at -0.51 0 180)"), "{text}");
        assert!(text.contains("(at 0 -1.17 180)"), "{text}");
        assert_eq!(fp.rotation(), 180.0);
    }

    #[test]
    fn test_legacy_module_and_fp_text() {
        let mut fp = Footprint::parse(
            r#"(module Lib:LED (layer F.Cu) (tedit 5F0C2A1B)
                (at 5 5 -90)
                (fp_text reference D1 (at 0 -2) (layer F.SilkS))
                (fp_text value LED (at 0 2) (layer F.Fab))
                (pad 1 smd rect (at -1 0 -90) (size 1 1) (layers F.Cu) (net 2 /LED_K)))"#,
        )
        .unwrap();
        assert_eq!(fp.fpid(), "Lib:LED");
        assert_eq!(fp.reference(), "D1");
        assert_eq!(fp.value(), "LED");
        assert_eq!(fp.rotation(), -90.0);
        assert_eq!(fp.pads(), [("1".to_string(), "/LED_K".to_string())]);

        fp.set_value("Red");
        assert_eq!(fp.value(), "Red");
        assert_eq!(fp.to_sexpr().find_all_lists("property").len(), 0);
    }

    #[test]
    fn test_set_pad_net() {
        let mut fp = Footprint::from_library(R0402, "Resistor_SMD:R_0402_1005Metric").unwrap();
        let gnd = Net::new(3, "GND");
        assert_eq!(fp.set_pad_net("2", &gnd), 1);
        assert_eq!(fp.set_pad_net("9", &gnd), 0);
        assert!(fp.has_pad("1"));
        assert_eq!(
            fp.pads(),
            [
                ("1".to_string(), String::new()),
                ("2".to_string(), "GND".to_string())
            ]
        );
    }
}
