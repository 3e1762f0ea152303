//! Writing S-expressions back to text.
//!
//! The layout is close to what KiCad itself produces: lists whose children are
//! all atoms stay on one line, every nested list starts on its own line and is
//! indented with one tab per level. KiCad re-formats files when it saves them,
//! so only readability and round-tripping matter here.

use crate::{Sexpr, SexprKind};

/// Format a tree as text, terminated by a newline.
pub fn format_tree(sexpr: &Sexpr) -> String {
    let mut out = String::new();
    write_node(sexpr, 0, &mut out);
    out.push('\n');
    out
}

fn write_node(node: &Sexpr, depth: usize, out: &mut String) {
    match &node.kind {
        SexprKind::Symbol(s) => out.push_str(s),
        SexprKind::String(s) => out.push_str(&quote_string(s)),
        SexprKind::List(items) => write_list(items, depth, out),
    }
}

fn write_list(items: &[Sexpr], depth: usize, out: &mut String) {
    out.push('(');
    let mut multiline = false;
    for (i, item) in items.iter().enumerate() {
        if item.is_list() {
            out.push('\n');
            push_indent(out, depth + 1);
            write_node(item, depth + 1, out);
            multiline = true;
        } else {
            if i > 0 {
                out.push(' ');
            }
            write_node(item, depth + 1, out);
        }
    }
    if multiline {
        out.push('\n');
        push_indent(out, depth);
    }
    out.push(')');
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Quote and escape a string for KiCad S-expression output.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Shortest decimal form with at most six fractional digits (KiCad's
/// board-unit precision is 1 nm).
pub fn format_number(value: f64) -> String {
    let mut s = format!("{value:.6}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_format_flat_list() {
        let sexpr = Sexpr::list(vec![
            Sexpr::symbol("at"),
            Sexpr::number(10.0),
            Sexpr::number(20.5),
        ]);
        assert_eq!(format_tree(&sexpr), "(at 10 20.5)\n");
    }

    #[test]
    fn test_format_nested() {
        let sexpr = parse(r#"(footprint "R_0402" (layer "F.Cu") (at 1 2 90))"#).unwrap();
        assert_eq!(
            format_tree(&sexpr),
            "(footprint \"R_0402\"\n\t(layer \"F.Cu\")\n\t(at 1 2 90)\n)\n"
        );
    }

    #[test]
    fn test_roundtrip() {
        let inputs = [
            "(simple list)",
            "(nested (list with) (multiple levels))",
            r#"(with "quoted \"string\"" and atoms)"#,
            r#"(pad "1" smd roundrect (at -0.48 0) (size 0.56 0.62) (layers "F.Cu" "F.Mask"))"#,
        ];
        for input in inputs {
            let parsed = parse(input).unwrap();
            let reparsed = parse(&format_tree(&parsed)).unwrap();
            assert_eq!(parsed, reparsed, "Roundtrip failed for: {input}");
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(25.0), "25");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-1.25), "-1.25");
        assert_eq!(format_number(-0.0000001), "0");
    }
}
