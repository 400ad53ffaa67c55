//! Search-box grammar.
//!
//! A query is a list of segments joined by `AND` (any case, whitespace on
//! both sides). Each segment is either `key OP value` for a known key or
//! free text matched against the ip and domain fields.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_AND: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Ip,
    Domain,
    Port,
}

/// Case-insensitive key aliases. Keys not listed here are not fields.
const FIELD_ALIASES: [(&str, Field); 5] = [
    ("ip", Field::Ip),
    ("ipv4", Field::Ip),
    ("domain", Field::Domain),
    ("port", Field::Port),
    ("ports", Field::Port),
];

pub fn resolve_field(key: &str) -> Option<Field> {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(key))
        .map(|(_, field)| *field)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

// Two-character operators first so `>=` is never read as `>` then `=`.
const OPERATORS: [(&str, Operator); 7] = [
    ("!=", Operator::Ne),
    (">=", Operator::Gte),
    ("<=", Operator::Lte),
    (":", Operator::Eq),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("=", Operator::Eq),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Ip,
    Domain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPredicate {
    pub op: Operator,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Matches when the ip or the domain contains the text.
    FreeText(String),
    /// Substring/regex match on one text field. The operator is kept for
    /// diagnostics only; every text clause is a positive match.
    Text {
        field: TextField,
        op: Operator,
        value: String,
    },
    /// Evaluated in memory against the extracted port set.
    Port(PortPredicate),
}

impl Clause {
    pub fn is_storage_evaluable(&self) -> bool {
        !matches!(self, Clause::Port(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub clauses: Vec<Clause>,
}

impl ParsedQuery {
    pub fn storage_clauses(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.is_storage_evaluable())
    }

    pub fn port_predicates(&self) -> impl Iterator<Item = &PortPredicate> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Port(p) => Some(p),
            _ => None,
        })
    }
}

#[derive(Debug, PartialEq)]
struct FieldToken<'a> {
    key: &'a str,
    op: Operator,
    value: &'a str,
}

/// `identifier ws* OP ws* value`, anchored at the start of the segment.
fn tokenize(segment: &str) -> Option<FieldToken<'_>> {
    let key_end = segment
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(segment.len());
    if key_end == 0 {
        return None;
    }
    let key = &segment[..key_end];
    let rest = segment[key_end..].trim_start();
    let (symbol, op) = OPERATORS.iter().find(|(symbol, _)| rest.starts_with(symbol))?;
    let value = rest[symbol.len()..].trim();
    Some(FieldToken { key, op: *op, value })
}

fn parse_segment(segment: &str) -> Option<Clause> {
    let Some(token) = tokenize(segment) else {
        return Some(Clause::FreeText(segment.to_string()));
    };
    match resolve_field(token.key) {
        Some(Field::Port) => {
            // non-numeric port values have nothing to compare against
            let value = token.value.parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some(Clause::Port(PortPredicate { op: token.op, value }))
        }
        Some(Field::Ip) => Some(Clause::Text {
            field: TextField::Ip,
            op: token.op,
            value: token.value.to_string(),
        }),
        Some(Field::Domain) => Some(Clause::Text {
            field: TextField::Domain,
            op: token.op,
            value: token.value.to_string(),
        }),
        None => Some(Clause::FreeText(segment.to_string())),
    }
}

/// Parse a search string into clauses, in input order. Never fails:
/// unusable segments fall back to free text or are dropped.
pub fn parse(input: &str) -> ParsedQuery {
    let clauses = RE_AND
        .split(input)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(parse_segment)
        .collect();
    ParsedQuery { clauses }
}

/// Ip patterns match dots literally; the rest of the value stays a pattern.
pub fn escape_dots(value: &str) -> String {
    value.replace('.', r"\.")
}
