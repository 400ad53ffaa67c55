use serde_json::Value;

use crate::ports::extract_ports;
use crate::query::{escape_dots, Clause, Operator, ParsedQuery, PortPredicate, TextField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreField {
    Ipv4,
    Domain,
}

impl StoreField {
    pub fn key(&self) -> &'static str {
        match self {
            StoreField::Ipv4 => "ipv4",
            StoreField::Domain => "domain",
        }
    }
}

/// One storage-side condition. Patterns are regular expressions matched
/// case-insensitively anywhere in the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Matches { field: StoreField, pattern: String },
    AnyOf(Vec<Condition>),
}

/// Conjunction of conditions handed to the record store. Empty means
/// "every record".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreQuery {
    pub conditions: Vec<Condition>,
}

impl StoreQuery {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn ip_condition(value: &str) -> Condition {
    Condition::Matches { field: StoreField::Ipv4, pattern: escape_dots(value) }
}

fn domain_condition(value: &str) -> Condition {
    Condition::Matches { field: StoreField::Domain, pattern: value.to_string() }
}

/// Stage A: translate the storage-evaluable clauses into a store query.
pub fn store_query(parsed: &ParsedQuery) -> StoreQuery {
    let conditions = parsed
        .storage_clauses()
        .filter_map(|clause| match clause {
            Clause::FreeText(text) => Some(Condition::AnyOf(vec![
                ip_condition(text),
                domain_condition(text),
            ])),
            Clause::Text { field: TextField::Ip, value, .. } => Some(ip_condition(value)),
            Clause::Text { field: TextField::Domain, value, .. } => Some(domain_condition(value)),
            Clause::Port(_) => None,
        })
        .collect();
    StoreQuery { conditions }
}

impl PortPredicate {
    /// Range operators need one satisfying port; `Eq`/`Ne` test membership.
    pub fn matches(&self, ports: &[i64]) -> bool {
        let v = self.value;
        match self.op {
            Operator::Gt => ports.iter().any(|&p| (p as f64) > v),
            Operator::Gte => ports.iter().any(|&p| (p as f64) >= v),
            Operator::Lt => ports.iter().any(|&p| (p as f64) < v),
            Operator::Lte => ports.iter().any(|&p| (p as f64) <= v),
            Operator::Eq => ports.iter().any(|&p| (p as f64) == v),
            Operator::Ne => !ports.iter().any(|&p| (p as f64) == v),
        }
    }
}

/// A store result paired with its extracted port set.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: Value,
    pub ports: Vec<i64>,
}

/// Stage B: extract ports from every record and keep those satisfying all
/// port predicates. Input order is preserved.
pub fn apply_port_filters(records: Vec<Value>, predicates: &[PortPredicate]) -> Vec<Candidate> {
    records
        .into_iter()
        .map(|record| {
            let ports = extract_ports(&record);
            Candidate { record, ports }
        })
        .filter(|c| predicates.iter().all(|p| p.matches(&c.ports)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use serde_json::json;

    fn pred(op: Operator, value: f64) -> PortPredicate {
        PortPredicate { op, value }
    }

    #[test]
    fn test_store_query_shapes() {
        let q = store_query(&parse("ip:10.0.0.1 AND domain=a.b AND web.corp AND port>1"));
        assert_eq!(
            q.conditions,
            vec![
                Condition::Matches { field: StoreField::Ipv4, pattern: r"10\.0\.0\.1".into() },
                Condition::Matches { field: StoreField::Domain, pattern: "a.b".into() },
                Condition::AnyOf(vec![
                    Condition::Matches { field: StoreField::Ipv4, pattern: r"web\.corp".into() },
                    Condition::Matches { field: StoreField::Domain, pattern: "web.corp".into() },
                ]),
            ]
        );
    }

    #[test]
    fn test_store_query_empty_for_port_only() {
        assert!(store_query(&parse("port=22")).is_empty());
        assert!(store_query(&parse("")).is_empty());
    }

    #[test]
    fn test_range_operators_need_one_match() {
        let ports = [22, 80, 8080];
        assert!(pred(Operator::Gt, 1000.0).matches(&ports));
        assert!(!pred(Operator::Gt, 8080.0).matches(&ports));
        assert!(pred(Operator::Gte, 8080.0).matches(&ports));
        assert!(pred(Operator::Lt, 23.0).matches(&ports));
        assert!(!pred(Operator::Lt, 22.0).matches(&ports));
        assert!(pred(Operator::Lte, 22.0).matches(&ports));
    }

    #[test]
    fn test_membership_operators() {
        let ports = [80, 443];
        assert!(pred(Operator::Eq, 443.0).matches(&ports));
        assert!(!pred(Operator::Eq, 444.0).matches(&ports));
        assert!(pred(Operator::Ne, 22.0).matches(&ports));
        assert!(!pred(Operator::Ne, 80.0).matches(&ports));
        assert!(!pred(Operator::Eq, 80.5).matches(&ports));
    }

    #[test]
    fn test_empty_port_set() {
        let none: [i64; 0] = [];
        assert!(pred(Operator::Ne, 443.0).matches(&none));
        for op in [Operator::Eq, Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte] {
            assert!(!pred(op, 443.0).matches(&none));
        }
    }

    #[test]
    fn test_apply_port_filters() {
        let records = vec![
            json!({"ipv4": "10.0.0.1", "nmap": {"port": 80}}),
            json!({"ipv4": "10.0.0.1", "nmap": {"port": 8080}}),
            json!({"ipv4": "10.0.0.2"}),
        ];
        let kept = apply_port_filters(records.clone(), &[pred(Operator::Gt, 1000.0)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ports, vec![8080]);

        let kept = apply_port_filters(records.clone(), &[pred(Operator::Ne, 443.0)]);
        assert_eq!(kept.len(), 3);

        let kept = apply_port_filters(records, &[]);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2].ports, Vec::<i64>::new());
    }

    #[test]
    fn test_port_predicates_are_conjoined() {
        let records = vec![
            json!({"a": {"port": 22}}),
            json!({"a": [{"port": 22}, {"port": 5000}]}),
            json!({"a": {"port": 9500}}),
        ];
        let kept = apply_port_filters(
            records,
            &[pred(Operator::Gt, 1000.0), pred(Operator::Lt, 9000.0)],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ports, vec![22, 5000]);
    }
}
