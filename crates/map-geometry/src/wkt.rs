//! Minimal reader for OGC well-known-text coordinate system definitions.
//!
//! Only the structure is parsed: `KEYWORD[value, value, ...]` where a value is
//! a quoted string, a number, a bare enumeration (e.g. `EAST`) or a nested
//! node. This is enough to validate a definition and to classify it as
//! geographic or projected without pulling in a projection library.

use crate::{GeometryError, GeometryResult};

/// Root keywords of WKT1 and WKT2 coordinate reference systems.
const CRS_KEYWORDS: [&str; 16] = [
    "GEOGCS", "PROJCS", "GEOCCS", "COMPD_CS", "VERT_CS", "LOCAL_CS", "GEOGCRS", "GEOGRAPHICCRS",
    "PROJCRS", "PROJECTEDCRS", "GEODCRS", "GEODETICCRS", "BASEGEOGCRS", "COMPOUNDCRS", "VERTCRS", "ENGCRS",
];

/// A parsed WKT node such as `GEOGCS["WGS 84", DATUM[...], ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub values: Vec<WktValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    Node(WktNode),
    Text(String),
    Number(f64),
    Enumeration(String),
}

impl WktNode {
    /// Parse a complete WKT definition. Trailing content is an error.
    pub fn parse(wkt: &str) -> GeometryResult<WktNode> {
        let mut parser = Parser {
            chars: wkt.char_indices().collect(),
            pos: 0,
        };
        parser.skip_whitespace();
        let node = parser.parse_node()?;
        parser.skip_whitespace();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected content after definition"));
        }
        Ok(node)
    }

    /// Direct child nodes with the given keyword (case-insensitive).
    pub fn children<'a, 'k>(&'a self, keyword: &'k str) -> impl Iterator<Item = &'a WktNode> + 'k
    where
        'a: 'k,
    {
        self.values.iter().filter_map(move |value| match value {
            WktValue::Node(node) if node.keyword.eq_ignore_ascii_case(keyword) => Some(node),
            _ => None,
        })
    }

    pub fn child(&self, keyword: &str) -> Option<&WktNode> {
        self.children(keyword).next()
    }

    /// The first quoted string value, which is the name for most nodes.
    pub fn name(&self) -> Option<&str> {
        self.values.iter().find_map(|value| match value {
            WktValue::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Resolve the EPSG code declared directly on this node, from either
    /// `AUTHORITY["EPSG","3857"]` (WKT1) or `ID["EPSG",3857]` (WKT2).
    pub fn epsg_code(&self) -> Option<u32> {
        let authority = self.child("AUTHORITY").or_else(|| self.child("ID"))?;
        let mut values = authority.values.iter();
        match values.next() {
            Some(WktValue::Text(name)) if name.eq_ignore_ascii_case("EPSG") => {}
            _ => return None,
        }
        match values.next()? {
            WktValue::Text(code) => code.trim().parse().ok(),
            WktValue::Number(code) if code.fract() == 0.0 && *code >= 0.0 => Some(*code as u32),
            _ => None,
        }
    }

    /// True if the node defines a coordinate reference system at all.
    pub fn is_crs(&self) -> bool {
        CRS_KEYWORDS.iter().any(|k| self.keyword.eq_ignore_ascii_case(k))
    }

    /// True for geographic (latitude/longitude) coordinate systems.
    pub fn is_geographic(&self) -> bool {
        ["GEOGCS", "GEOGCRS", "GEOGRAPHICCRS"]
            .iter()
            .any(|k| self.keyword.eq_ignore_ascii_case(k))
    }

    /// True for projected coordinate systems.
    pub fn is_projected(&self) -> bool {
        ["PROJCS", "PROJCRS", "PROJECTEDCRS"]
            .iter()
            .any(|k| self.keyword.eq_ignore_ascii_case(k))
    }

    /// True for the spherical Mercator used by web tiling schemes.
    pub fn is_web_mercator(&self) -> bool {
        if !self.is_projected() {
            return false;
        }
        let method = self
            .child("PROJECTION")
            .or_else(|| self.child("CONVERSION").and_then(|c| c.child("METHOD")))
            .and_then(WktNode::name)
            .unwrap_or_default()
            .to_ascii_lowercase();
        let name = self.name().unwrap_or_default().to_ascii_lowercase();

        method.contains("mercator_auxiliary_sphere")
            || method.contains("popular visualisation pseudo mercator")
            || name.contains("pseudo-mercator")
            || name.contains("web_mercator")
            || name.contains("web mercator")
    }
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or_else(|| self.chars.last().map(|(i, c)| i + c.len_utf8()).unwrap_or(0))
    }

    fn error(&self, message: &str) -> GeometryError {
        GeometryError::InvalidWkt {
            position: self.offset(),
            message: message.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_keyword(&mut self) -> GeometryResult<String> {
        let mut keyword = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                keyword.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if keyword.is_empty() || !keyword.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(self.error("expected keyword"));
        }
        Ok(keyword)
    }

    fn parse_node(&mut self) -> GeometryResult<WktNode> {
        let keyword = self.parse_keyword()?;
        self.skip_whitespace();

        let close = match self.peek() {
            Some('[') => ']',
            Some('(') => ')',
            _ => return Err(self.error("expected '[' or '('")),
        };
        self.pos += 1;

        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            values.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.error("expected ',' or closing bracket")),
                None => return Err(self.error("unterminated node")),
            }
        }

        Ok(WktNode { keyword, values })
    }

    fn parse_value(&mut self) -> GeometryResult<WktValue> {
        match self.peek() {
            Some('"') => self.parse_text().map(WktValue::Text),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.parse_number().map(WktValue::Number)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                let keyword = self.parse_keyword()?;
                self.skip_whitespace();
                if matches!(self.peek(), Some('[') | Some('(')) {
                    self.pos = start;
                    self.parse_node().map(WktValue::Node)
                } else {
                    Ok(WktValue::Enumeration(keyword))
                }
            }
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of definition")),
        }
    }

    fn parse_text(&mut self) -> GeometryResult<String> {
        // Opening quote
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.pos += 1;
                    // A doubled quote is an escaped quote
                    if self.peek() == Some('"') {
                        text.push('"');
                        self.pos += 1;
                    } else {
                        return Ok(text);
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_number(&mut self) -> GeometryResult<f64> {
        let start = self.pos;
        let mut number = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                number.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        number.parse().map_err(|_| {
            self.pos = start;
            self.error("invalid number")
        })
    }
}
