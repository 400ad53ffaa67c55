use serde_json::Value;
use std::collections::BTreeSet;

fn is_port_key(key: &str) -> bool {
    key == "port" || key == "ports"
}

/// Coerce a scalar found under a port key. Integers pass through, integral
/// floats and numeric strings are converted, everything else is dropped.
fn coerce_port(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn collect(v: &Value, ports: &mut BTreeSet<i64>) {
    match v {
        Value::Array(items) => ports.extend(items.iter().filter_map(coerce_port)),
        other => ports.extend(coerce_port(other)),
    }
}

fn walk(v: &Value, ports: &mut BTreeSet<i64>) {
    match v {
        Value::Array(arr) => {
            for elem in arr {
                walk(elem, ports)
            }
        }
        Value::Object(map) => {
            for (k, val) in map {
                if is_port_key(k) {
                    collect(val, ports);
                }
                // keep descending: a port value may itself nest more port keys
                walk(val, ports)
            }
        }
        _ => {}
    }
}

/// Every distinct port number found under a `port`/`ports` key anywhere in
/// `record`, ascending.
pub fn extract_ports(record: &Value) -> Vec<i64> {
    let mut ports = BTreeSet::new();
    walk(record, &mut ports);
    ports.into_iter().collect()
}
