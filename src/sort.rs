use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::filter::Candidate;
use crate::types::{SortKey, SortOrder, DERIVED_KEYS, IDENTITY_KEYS};

/// A filtered record with its per-request attributes.
#[derive(Debug, Clone)]
pub struct DerivedRecord {
    pub record: Value,
    pub ports: Vec<i64>,
    pub port_count: usize,
    pub tool_count: usize,
}

impl DerivedRecord {
    /// The record as returned to callers, with `unifiedPorts`, `portCount`
    /// and `toolCount` attached. Non-object records are returned untouched.
    pub fn into_value(self) -> Value {
        let DerivedRecord { record, ports, port_count, tool_count } = self;
        match record {
            Value::Object(mut map) => {
                map.insert("unifiedPorts".to_string(), Value::from(ports));
                map.insert("portCount".to_string(), Value::from(port_count));
                map.insert("toolCount".to_string(), Value::from(tool_count));
                Value::Object(map)
            }
            other => other,
        }
    }
}

/// Number of top-level tool sections: every key that is neither identity
/// nor derived.
pub fn tool_count(record: &Value) -> usize {
    record
        .as_object()
        .map(|map: &Map<String, Value>| {
            map.keys()
                .filter(|k| !IDENTITY_KEYS.contains(&k.as_str()) && !DERIVED_KEYS.contains(&k.as_str()))
                .count()
        })
        .unwrap_or(0)
}

pub fn derive(candidate: Candidate) -> DerivedRecord {
    let tool_count = tool_count(&candidate.record);
    DerivedRecord {
        port_count: candidate.ports.len(),
        tool_count,
        ports: candidate.ports,
        record: candidate.record,
    }
}

// Missing or non-string values compare as `None`, below every string.
fn text_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(|v| v.as_str())
}

fn compare(a: &DerivedRecord, b: &DerivedRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Ip => text_field(&a.record, "ipv4").cmp(&text_field(&b.record, "ipv4")),
        SortKey::Domain => text_field(&a.record, "domain").cmp(&text_field(&b.record, "domain")),
        SortKey::Tools => a.tool_count.cmp(&b.tool_count),
        SortKey::Ports => a.port_count.cmp(&b.port_count),
    }
}

/// Stable sort: records with equal keys keep their relative order in both
/// directions.
pub fn sort_records(records: &mut [DerivedRecord], key: SortKey, order: SortOrder) {
    records.sort_by(|a, b| {
        let ord = compare(a, b, key);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}
