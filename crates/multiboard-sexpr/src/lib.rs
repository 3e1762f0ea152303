//! A small S-expression reader/writer for KiCad documents.
//!
//! Unquoted atoms are kept as the exact text found in the source, so numbers,
//! layer names and legacy unquoted timestamps survive a read/write cycle
//! unchanged. Numeric views are computed on demand with [`Sexpr::as_f64`] and
//! [`Sexpr::as_i64`].
//!
//! - [`parse`] reads a single expression
//! - [`formatter::format_tree`] writes one back out with tab indentation
//! - [`kicad`] holds helpers for the KiCad-specific shapes (`(tag value)`
//!   properties, footprint properties, `fp_lib_table` files)

pub mod formatter;
pub mod kicad;

use std::fmt;

/// Find a direct child list `(name ...)` within a list of [`Sexpr`] nodes.
pub fn find_child_list<'a>(items: &'a [Sexpr], name: &str) -> Option<&'a [Sexpr]> {
    items
        .iter()
        .filter_map(Sexpr::as_list)
        .find(|list| list.first().and_then(Sexpr::as_sym) == Some(name))
}

/// Find all direct child lists `(name ...)` within a list of [`Sexpr`] nodes.
pub fn find_all_child_lists<'a>(items: &'a [Sexpr], name: &str) -> Vec<&'a [Sexpr]> {
    items
        .iter()
        .filter_map(Sexpr::as_list)
        .filter(|list| list.first().and_then(Sexpr::as_sym) == Some(name))
        .collect()
}

/// The kind of S-expression value
#[derive(Debug, Clone, PartialEq)]
pub enum SexprKind {
    /// An unquoted atom, stored verbatim (`F.Cu`, `12.7`, `yes`, `smd`)
    Symbol(String),
    /// A quoted string, stored unescaped
    String(String),
    /// A list of S-expressions
    List(Vec<Sexpr>),
}

/// An S-expression value
#[derive(Debug, Clone, PartialEq)]
pub struct Sexpr {
    pub kind: SexprKind,
}

impl Sexpr {
    /// Create a symbol (unquoted atom)
    pub fn symbol(s: impl Into<String>) -> Self {
        Self {
            kind: SexprKind::Symbol(s.into()),
        }
    }

    /// Create a string (quoted atom)
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            kind: SexprKind::String(s.into()),
        }
    }

    /// Create a numeric atom using KiCad's shortest decimal form
    pub fn number(value: f64) -> Self {
        Self::symbol(formatter::format_number(value))
    }

    /// Create an integer atom
    pub fn int(value: i64) -> Self {
        Self::symbol(value.to_string())
    }

    /// Create a list
    pub fn list(items: Vec<Sexpr>) -> Self {
        Self {
            kind: SexprKind::List(items),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, SexprKind::List(_))
    }

    /// Get the symbol text if this is an unquoted atom
    pub fn as_sym(&self) -> Option<&str> {
        match &self.kind {
            SexprKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Get the string content if this is a quoted string
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            SexprKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the text of either kind of atom.
    ///
    /// Older KiCad files leave some strings unquoted, so readers that only care
    /// about the text should use this.
    pub fn as_atom(&self) -> Option<&str> {
        match &self.kind {
            SexprKind::Symbol(s) | SexprKind::String(s) => Some(s),
            SexprKind::List(_) => None,
        }
    }

    /// Interpret an unquoted atom as a floating point number
    pub fn as_f64(&self) -> Option<f64> {
        let text = self.as_sym()?;
        if !looks_numeric(text) {
            return None;
        }
        text.parse().ok()
    }

    /// Interpret an unquoted atom as an integer
    pub fn as_i64(&self) -> Option<i64> {
        self.as_sym()?.parse().ok()
    }

    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match &self.kind {
            SexprKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Sexpr>> {
        match &mut self.kind {
            SexprKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// The leading symbol of a list: `footprint` for `(footprint ...)`
    pub fn tag(&self) -> Option<&str> {
        self.as_list()?.first()?.as_sym()
    }

    /// Find a child list with the given tag
    pub fn find_list(&self, name: &str) -> Option<&[Sexpr]> {
        find_child_list(self.as_list()?, name)
    }

    /// Find all child lists with the given tag
    pub fn find_all_lists(&self, name: &str) -> Vec<&[Sexpr]> {
        self.as_list()
            .map(|items| find_all_child_lists(items, name))
            .unwrap_or_default()
    }
}

/// `nan`, `inf` and friends parse as floats in Rust; KiCad never writes them.
fn looks_numeric(text: &str) -> bool {
    matches!(
        text.as_bytes().first(),
        Some(b'0'..=b'9' | b'-' | b'+' | b'.')
    )
}

/// Create a key-value pair list `(k v)`
pub fn kv<K: Into<String>>(k: K, v: Sexpr) -> Sexpr {
    Sexpr::list(vec![Sexpr::symbol(k), v])
}

/// Parser for S-expressions
pub struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            input,
            chars: input.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Parse one expression
    pub fn parse(&mut self) -> Result<Sexpr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(ParseError::UnexpectedEof),
            Some('(') => self.parse_list(),
            Some(')') => Err(ParseError::UnexpectedClose(self.pos)),
            Some('"') => self.parse_string(),
            Some(_) => self.parse_symbol(),
        }
    }

    fn parse_list(&mut self) -> Result<Sexpr, ParseError> {
        let start = self.pos;
        self.advance();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::UnclosedList(start)),
                Some(')') => {
                    self.advance();
                    return Ok(Sexpr::list(items));
                }
                Some(_) => items.push(self.parse()?),
            }
        }
    }

    fn parse_symbol(&mut self) -> Result<Sexpr, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            self.advance();
        }
        Ok(Sexpr::symbol(&self.input[start..self.pos]))
    }

    fn parse_string(&mut self) -> Result<Sexpr, ParseError> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnterminatedString(start)),
                Some('"') => {
                    self.advance();
                    return Ok(Sexpr::string(out));
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.peek() else {
                        return Err(ParseError::UnterminatedString(start));
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                    self.advance();
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == ';' {
                while let Some(ch) = self.peek() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn advance(&mut self) {
        if let Some((pos, ch)) = self.chars.next() {
            self.pos = pos + ch.len_utf8();
        }
    }
}

/// Parse a string into an S-expression
pub fn parse(input: &str) -> Result<Sexpr, ParseError> {
    log::trace!("Parsing S-expression from {} bytes of input", input.len());
    Parser::new(input).parse()
}

/// Errors that can occur during parsing. Offsets are byte positions.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedEof,
    UnexpectedClose(usize),
    UnclosedList(usize),
    UnterminatedString(usize),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedEof => write!(f, "Unexpected end of input"),
            ParseError::UnexpectedClose(at) => write!(f, "Unexpected ')' at byte {at}"),
            ParseError::UnclosedList(at) => write!(f, "Unclosed list starting at byte {at}"),
            ParseError::UnterminatedString(at) => {
                write!(f, "Unterminated string starting at byte {at}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = formatter::format_tree(self);
        write!(f, "{}", formatted.trim_end_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atoms() {
        assert_eq!(parse("hello").unwrap(), Sexpr::symbol("hello"));
        assert_eq!(parse("\"hello world\"").unwrap(), Sexpr::string("hello world"));
        assert_eq!(parse("12.70").unwrap().as_f64(), Some(12.7));
        assert_eq!(parse("-3").unwrap().as_i64(), Some(-3));
    }

    #[test]
    fn test_symbols_that_are_not_numbers() {
        assert_eq!(parse("nan").unwrap().as_f64(), None);
        assert_eq!(parse("inf").unwrap().as_f64(), None);
        assert_eq!(parse("F.Cu").unwrap().as_f64(), None);
    }

    #[test]
    fn test_numbers_keep_source_text() {
        let parsed = parse("(at 10.000 20 90.0)").unwrap();
        assert_eq!(parsed.to_string(), "(at 10.000 20 90.0)");
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(
            parse("\"with\\\"quotes\\\"\"").unwrap(),
            Sexpr::string("with\"quotes\"")
        );
        assert_eq!(
            parse("\"line\\nbreak\"").unwrap(),
            Sexpr::string("line\nbreak")
        );
    }

    #[test]
    fn test_parse_nested_with_comments() {
        let input = r#"
        ; leading comment
        (footprint "R" ; inline
          (layer "F.Cu")
          (at 1 2))
        "#;
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.tag(), Some("footprint"));
        let layer = parsed.find_list("layer").unwrap();
        assert_eq!(layer[1].as_str(), Some("F.Cu"));
        assert_eq!(parsed.find_all_lists("at").len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(""), Err(ParseError::UnexpectedEof));
        assert_eq!(parse("(a (b)"), Err(ParseError::UnclosedList(0)));
        assert_eq!(parse("(a \"b)"), Err(ParseError::UnterminatedString(3)));
        assert_eq!(parse(")"), Err(ParseError::UnexpectedClose(0)));
    }

    #[test]
    fn test_utf8_strings() {
        let parsed = parse(r#"(value "résistance" "日本語")"#).unwrap();
        let items = parsed.as_list().unwrap();
        assert_eq!(items[1].as_str(), Some("résistance"));
        assert_eq!(items[2].as_str(), Some("日本語"));
    }
}
