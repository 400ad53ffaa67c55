use anyhow::{Context, Result};
use serde_json::Value;

use crate::filter::{apply_port_filters, store_query};
use crate::paginate::paginate;
use crate::query::{parse, ParsedQuery, PortPredicate};
use crate::sort::{derive, sort_records, DerivedRecord};
use crate::store::RecordStore;
use crate::types::{ListParams, ListResponse};

/// In-memory half of a list request: port filtering, derivation, sorting
/// and pagination over the records the store returned.
pub fn process(records: Vec<Value>, parsed: &ParsedQuery, params: &ListParams) -> ListResponse {
    let fetched = records.len();
    let predicates: Vec<PortPredicate> = parsed.port_predicates().copied().collect();
    let candidates = apply_port_filters(records, &predicates);
    tracing::debug!(fetched, remaining = candidates.len(), "applied port filters");

    let mut derived: Vec<DerivedRecord> = candidates.into_iter().map(derive).collect();
    sort_records(&mut derived, params.sort_key, params.sort_order);

    let page = paginate(derived, params.page, params.limit);
    ListResponse {
        data: page.items.into_iter().map(DerivedRecord::into_value).collect(),
        pagination: page.pagination,
    }
}

pub struct Engine<S> {
    store: S,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run one list request end to end. A store failure fails the whole
    /// request; nothing partial is returned.
    pub async fn list(&self, params: &ListParams) -> Result<ListResponse> {
        let parsed = parse(&params.search);
        tracing::debug!(search = %params.search, clauses = ?parsed.clauses, "parsed search");
        let query = store_query(&parsed);
        tracing::debug!(?query, "executing store query");
        let records = self.store.find(&query).await.context("fetching records")?;
        Ok(process(records, &parsed, params))
    }

    /// `None` when no record carries this id.
    pub async fn get(&self, id: &str) -> Result<Option<Value>> {
        self.store
            .find_by_id(id)
            .await
            .with_context(|| format!("fetching record {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{SortKey, SortOrder};
    use serde_json::json;

    fn params(search: &str) -> ListParams {
        ListParams { search: search.to_string(), ..ListParams::default() }
    }

    fn ips(resp: &ListResponse) -> Vec<&str> {
        resp.data.iter().map(|r| r["ipv4"].as_str().unwrap_or("")).collect()
    }

    #[tokio::test]
    async fn test_ip_and_port_query() {
        let engine = Engine::new(MemoryStore::new(vec![
            json!({"_id": "1", "ipv4": "10.0.0.1", "nmap": {"port": 80}}),
            json!({"_id": "2", "ipv4": "10.0.0.1", "nmap": {"port": 8080}}),
        ]));
        let resp = engine.list(&params("ip:10.0.0.1 AND port>1000")).await.unwrap();
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0]["_id"], json!("2"));
        assert_eq!(resp.data[0]["unifiedPorts"], json!([8080]));
        assert_eq!(resp.pagination.total_records, 1);
        assert_eq!(resp.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn test_port_eq_and_ne_at_any_depth() {
        let engine = Engine::new(MemoryStore::new(vec![
            json!({"ipv4": "1.1.1.1", "httpx": [{"hosts": [{"ports": [{"port": 443}]}]}]}),
            json!({"ipv4": "2.2.2.2", "nmap": {"port": 22}}),
            json!({"ipv4": "3.3.3.3"}),
        ]));
        let eq = engine.list(&params("port=443")).await.unwrap();
        assert_eq!(ips(&eq), vec!["1.1.1.1"]);
        let ne = engine.list(&params("port!=443")).await.unwrap();
        assert_eq!(ips(&ne), vec!["2.2.2.2", "3.3.3.3"]);
    }

    #[tokio::test]
    async fn test_pagination_counts_after_filtering() {
        let records: Vec<Value> = (0..250)
            .map(|i| json!({"ipv4": format!("10.0.{:03}.{:03}", i / 256, i % 256), "s": {"port": i}}))
            .collect();
        let engine = Engine::new(MemoryStore::new(records));

        let p3 = ListParams { page: 3, ..params("") };
        let resp = engine.list(&p3).await.unwrap();
        assert_eq!(resp.data.len(), 50);
        assert_eq!(resp.pagination.total_pages, 3);
        assert_eq!(resp.data[0]["ipv4"], json!("10.0.000.200"));

        let p5 = ListParams { page: 5, ..params("") };
        let resp = engine.list(&p5).await.unwrap();
        assert!(resp.data.is_empty());
        assert_eq!(resp.pagination.current_page, 5);
        assert_eq!(resp.pagination.total_records, 250);

        let filtered = engine.list(&params("port<10")).await.unwrap();
        assert_eq!(filtered.pagination.total_records, 10);
    }

    #[tokio::test]
    async fn test_sort_by_ports_desc() {
        let engine = Engine::new(MemoryStore::new(vec![
            json!({"ipv4": "a", "s": [{"port": 1}]}),
            json!({"ipv4": "b", "s": [{"port": 1}, {"port": 2}, {"port": 3}]}),
            json!({"ipv4": "c", "s": [{"port": 1}, {"port": 2}]}),
        ]));
        let p = ListParams { sort_key: SortKey::Ports, sort_order: SortOrder::Desc, ..params("") };
        let resp = engine.list(&p).await.unwrap();
        assert_eq!(ips(&resp), vec!["b", "c", "a"]);
        assert_eq!(resp.data[0]["portCount"], json!(3));
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let engine = Engine::new(MemoryStore::new(vec![
            json!({"_id": "x", "ipv4": "9.9.9.9", "domain": "z.com", "nmap": {"port": "22"}}),
            json!({"_id": "y", "ipv4": "9.9.9.9", "domain": "a.com", "smap": [[{"ports": 80}]]}),
            json!({"_id": "z", "domain": "m.com"}),
        ]));
        let p = ListParams::from_raw(Some("1"), Some("2"), Some("9.9 AND port>=0"), Some("tools"), Some("desc"));
        let first = serde_json::to_string(&engine.list(&p).await.unwrap()).unwrap();
        for _ in 0..5 {
            let again = serde_json::to_string(&engine.list(&p).await.unwrap()).unwrap();
            assert_eq!(first, again);
        }
        assert!(first.contains("\"pagination\":{\"totalRecords\":2,\"totalPages\":1,\"currentPage\":1}"));
    }

    #[tokio::test]
    async fn test_store_error_fails_request() {
        let engine = Engine::new(MemoryStore::new(vec![json!({"domain": "a.com"})]));
        assert!(engine.list(&params("domain:[")).await.is_err());
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let engine = Engine::new(MemoryStore::new(vec![json!({"_id": {"$oid": "abc"}, "ipv4": "1.2.3.4"})]));
        assert!(engine.get("abc").await.unwrap().is_some());
        assert!(engine.get("missing").await.unwrap().is_none());
    }
}
