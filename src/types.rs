use serde::Serialize;
use serde_json::Value;

/// Top-level record keys that identify a host rather than hold tool output.
pub const IDENTITY_KEYS: [&str; 3] = ["_id", "ipv4", "domain"];

/// Keys added to each listed record at query time.
pub const DERIVED_KEYS: [&str; 3] = ["unifiedPorts", "portCount", "toolCount"];

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Ip,
    Domain,
    Tools,
    Ports,
}

impl SortKey {
    /// Unknown keys, including the externally handled `screenshot`, fall back to `Ip`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "domain" => SortKey::Domain,
            "tools" => SortKey::Tools,
            "ports" => SortKey::Ports,
            _ => SortKey::Ip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Self {
        if raw == "desc" { SortOrder::Desc } else { SortOrder::Asc }
    }
}

/// Inputs of one list request after lenient parsing.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub page: usize,
    pub limit: usize,
    pub search: String,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: String::new(),
            sort_key: SortKey::Ip,
            sort_order: SortOrder::Asc,
        }
    }
}

impl ListParams {
    /// Build params from raw caller strings. Malformed or non-positive
    /// page/limit values fall back to their defaults instead of failing.
    pub fn from_raw(
        page: Option<&str>,
        limit: Option<&str>,
        search: Option<&str>,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
    ) -> Self {
        Self {
            page: page.and_then(parse_positive).unwrap_or(DEFAULT_PAGE),
            limit: limit.and_then(parse_positive).unwrap_or(DEFAULT_LIMIT),
            search: search.unwrap_or_default().to_string(),
            sort_key: SortKey::parse(sort_by.unwrap_or("ip")),
            sort_order: SortOrder::parse(sort_order.unwrap_or("asc")),
        }
    }
}

/// Leading-integer parse: optional sign then digits, trailing garbage ignored
/// ("3abc" -> 3). Zero, negatives and non-numbers yield `None`.
fn parse_positive(raw: &str) -> Option<usize> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 || negative {
        return None;
    }
    match digits[..end].parse::<usize>() {
        Ok(0) => None,
        Ok(n) => Some(n),
        // all digits but too large for usize
        Err(_) => Some(usize::MAX),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_records: usize,
    pub total_pages: usize,
    pub current_page: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub data: Vec<Value>,
    pub pagination: Pagination,
}

/// Opaque record id as a string: plain strings as-is, extended JSON
/// `{"$oid": "..."}` unwrapped, numbers rendered.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(|v| v.as_str()).map(|s| s.to_string()),
        _ => None,
    }
}
