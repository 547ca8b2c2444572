//! Small parsers for the SQL fragments callers hand to the repository: ORDER BY
//! lists, an ORDER BY embedded at the end of a WHERE fragment, and simple
//! `col = literal AND ...` filters that the preload path can evaluate in memory.

use std::fmt;

use crate::value::is_integer_like;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderTerm {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for OrderTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction.as_sql())
    }
}

/// Parses `"col [ASC|DESC], col2 [ASC|DESC]"`. Anything other than `desc`
/// (case-insensitive) sorts ascending.
pub fn parse_order_by(order_by: &str) -> Vec<OrderTerm> {
    order_by
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let mut parts = term.split_whitespace();
            let column = parts.next().unwrap_or_default();
            let direction = match parts.next() {
                Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            OrderTerm {
                column: column.to_string(),
                direction,
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhereClause {
    pub filter: String,
    pub order: Option<OrderTerm>,
}

/// Splits an `ORDER BY <col> [ASC|DESC]` suffix off a WHERE fragment.
///
/// Keywords are case-insensitive and may be separated by any whitespace. The
/// rightmost occurrence wins; the filter is everything before it and anything
/// after the column and optional direction is dropped. The column is a word,
/// optionally qualified by one `.word`.
pub fn extract_order_by(fragment: &str) -> WhereClause {
    let bytes = fragment.as_bytes();
    for start in (0..bytes.len()).rev() {
        if let Some(order) = match_order_by(bytes, start) {
            return WhereClause {
                filter: fragment[..start].to_string(),
                order: Some(order),
            };
        }
    }
    WhereClause {
        filter: fragment.to_string(),
        order: None,
    }
}

fn match_order_by(bytes: &[u8], start: usize) -> Option<OrderTerm> {
    let mut pos = expect_word(bytes, start, b"ORDER")?;
    pos = expect_whitespace(bytes, pos)?;
    pos = expect_word(bytes, pos, b"BY")?;
    pos = expect_whitespace(bytes, pos)?;

    let column_start = pos;
    pos = word_end(bytes, pos)?;
    if bytes.get(pos) == Some(&b'.') {
        if let Some(end) = word_end(bytes, pos + 1) {
            pos = end;
        }
    }
    let column = String::from_utf8_lossy(&bytes[column_start..pos]).into_owned();

    let mut direction = SortDirection::Asc;
    if bytes.get(pos).is_some_and(|b| is_space(*b)) {
        if starts_with_ignore_case(&bytes[pos + 1..], b"DESC") {
            direction = SortDirection::Desc;
        }
    }
    Some(OrderTerm { column, direction })
}

fn expect_word(bytes: &[u8], pos: usize, word: &[u8]) -> Option<usize> {
    starts_with_ignore_case(&bytes[pos..], word).then_some(pos + word.len())
}

fn expect_whitespace(bytes: &[u8], pos: usize) -> Option<usize> {
    let end = pos + bytes[pos..].iter().take_while(|b| is_space(**b)).count();
    (end > pos).then_some(end)
}

fn word_end(bytes: &[u8], pos: usize) -> Option<usize> {
    let end = pos + bytes[pos.min(bytes.len())..]
        .iter()
        .take_while(|b| is_word(**b))
        .count();
    (end > pos).then_some(end)
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Column name to lower-cased expected value, in filter order.
pub type PropertyMap = Vec<(String, String)>;

/// Turns a WHERE fragment into an equality property map, or `None` when the
/// fragment uses anything the in-memory filter cannot evaluate exactly.
pub trait WhereClauseParser {
    fn parse_to_property_map(&self, fragment: &str, table: &str) -> Option<PropertyMap>;
}

/// Accepts `[AND] col = literal [AND col = literal ...]` where a literal is a
/// quoted string or a canonical integer. Columns may be qualified with the
/// queried table name. An empty fragment yields an empty map.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleWhereClauseParser;

impl WhereClauseParser for SimpleWhereClauseParser {
    fn parse_to_property_map(&self, fragment: &str, table: &str) -> Option<PropertyMap> {
        let mut cursor = Cursor::new(fragment);
        let mut properties = PropertyMap::new();

        cursor.skip_whitespace();
        let mut needs_condition = cursor.eat_keyword("AND");
        loop {
            cursor.skip_whitespace();
            if cursor.is_at_end() {
                if needs_condition {
                    return None;
                }
                break;
            }
            let column = cursor.identifier()?;
            cursor.skip_whitespace();
            if !cursor.eat_char('=') {
                return None;
            }
            cursor.skip_whitespace();
            let value = cursor.literal()?;
            let column = unqualified_column(&column, table)?;
            set_property(&mut properties, column, value.to_lowercase());

            cursor.skip_whitespace();
            if cursor.is_at_end() {
                break;
            }
            if !cursor.eat_keyword("AND") {
                return None;
            }
            needs_condition = true;
        }
        Some(properties)
    }
}

/// Strips a qualifier naming `table`; a column of any other table yields `None`.
pub(crate) fn unqualified_column(column: &str, table: &str) -> Option<String> {
    match column.split_once('.') {
        Some((qualifier, name)) if qualifier == table => Some(name.to_string()),
        Some(_) => None,
        None => Some(column.to_string()),
    }
}

fn set_property(properties: &mut PropertyMap, column: String, value: String) {
    match properties.iter_mut().find(|(name, _)| *name == column) {
        Some(entry) => entry.1 = value,
        None => properties.push((column, value)),
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat_char(&mut self, expected: char) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest().as_bytes();
        if !starts_with_ignore_case(rest, keyword.as_bytes()) {
            return false;
        }
        if rest.get(keyword.len()).is_some_and(|b| is_word(*b)) {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    fn identifier(&mut self) -> Option<String> {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let mut end = word_end(bytes, start)?;
        if bytes.get(end) == Some(&b'.') {
            end = word_end(bytes, end + 1)?;
        }
        self.pos = end;
        Some(self.input[start..end].to_string())
    }

    fn literal(&mut self) -> Option<String> {
        let rest = self.rest();
        let quote = rest.chars().next()?;
        if quote == '\'' || quote == '"' {
            let mut value = String::new();
            let mut chars = rest.char_indices().skip(1).peekable();
            while let Some((idx, ch)) = chars.next() {
                if ch == quote {
                    if chars.peek().is_some_and(|(_, next)| *next == quote) {
                        chars.next();
                        value.push(quote);
                        continue;
                    }
                    self.pos += idx + ch.len_utf8();
                    return Some(value);
                }
                value.push(ch);
            }
            return None;
        }
        let len = rest
            .char_indices()
            .take_while(|(idx, ch)| ch.is_ascii_digit() || (*idx == 0 && *ch == '-'))
            .count();
        let number = &rest[..len];
        if !is_integer_like(number) {
            return None;
        }
        self.pos += len;
        Some(number.to_string())
    }
}
