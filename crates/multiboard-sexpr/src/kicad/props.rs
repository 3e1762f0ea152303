//! Common KiCad "property-like" queries and edits.
//!
//! KiCad formats are built from small list nodes that act as key/value pairs:
//! `(layer "F.Cu")`, `(at 10 20 90)`, `(property "Reference" "R1" ...)`. The
//! readers here accept both quoted and unquoted atoms because older files mix
//! the two.

use crate::{Sexpr, find_child_list};

/// Find a direct child list `(tag ...)` within `list`.
pub fn child_list<'a>(list: &'a [Sexpr], tag: &str) -> Option<&'a [Sexpr]> {
    find_child_list(list, tag)
}

/// Find a text property `(tag "VALUE")` or `(tag VALUE)` within `list`.
pub fn string_prop(list: &[Sexpr], tag: &str) -> Option<String> {
    child_list(list, tag)?
        .get(1)?
        .as_atom()
        .map(|s| s.to_string())
}

/// Numeric arguments of `(tag n n n)`, stopping at the first non-number.
pub fn number_list(list: &[Sexpr], tag: &str) -> Option<Vec<f64>> {
    let items = child_list(list, tag)?;
    Some(items.iter().skip(1).map_while(Sexpr::as_f64).collect())
}

/// Value of `(property "NAME" "VALUE" ...)` within `list`.
pub fn property_value(list: &[Sexpr], name: &str) -> Option<String> {
    list.iter()
        .filter_map(Sexpr::as_list)
        .filter(|items| items.first().and_then(Sexpr::as_sym) == Some("property"))
        .find(|items| items.get(1).and_then(Sexpr::as_atom) == Some(name))
        .and_then(|items| items.get(2)?.as_atom().map(|s| s.to_string()))
}

/// Replace the value of `(property "NAME" ...)`, keeping its position and
/// effects. Appends a bare `(property "NAME" "VALUE")` when absent.
pub fn set_property(list: &mut Vec<Sexpr>, name: &str, value: &str) {
    for node in list.iter_mut() {
        let Some(items) = node.as_list_mut() else {
            continue;
        };
        if items.first().and_then(Sexpr::as_sym) != Some("property")
            || items.get(1).and_then(Sexpr::as_atom) != Some(name)
        {
            continue;
        }
        if items.len() > 2 {
            items[2] = Sexpr::string(value);
        } else {
            items.push(Sexpr::string(value));
        }
        return;
    }
    list.push(Sexpr::list(vec![
        Sexpr::symbol("property"),
        Sexpr::string(name),
        Sexpr::string(value),
    ]));
}

/// Replace the first `(tag ...)` child with `node`, or append it.
pub fn set_child(list: &mut Vec<Sexpr>, node: Sexpr) {
    let Some(tag) = node.tag().map(|t| t.to_string()) else {
        list.push(node);
        return;
    };
    match list.iter().position(|n| n.tag() == Some(tag.as_str())) {
        Some(idx) => list[idx] = node,
        None => list.push(node),
    }
}

/// Remove every direct `(tag ...)` child; returns how many were removed.
pub fn remove_children(list: &mut Vec<Sexpr>, tag: &str) -> usize {
    let before = list.len();
    list.retain(|n| n.tag() != Some(tag));
    before - list.len()
}
