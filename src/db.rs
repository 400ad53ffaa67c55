use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures_util::SinkExt; // for CopyInSink::send
use serde_json::Value;
use std::pin::pin;
use tokio::time::{sleep, Duration};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::filter::{Condition, StoreQuery};
use crate::store::RecordStore;

/// Postgres-backed record store: one `jsonb` document per row.
pub struct Db {
    pub client: Client,
    table: String,
}

fn valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Regex match of parameter `$n` against `doc->key`. Only a string value,
/// or a string element of an array value, can match.
fn text_match(key: &str, n: usize) -> String {
    format!(
        "((jsonb_typeof(doc->'{key}') = 'string' AND doc->>'{key}' ~* ${n}) \
         OR EXISTS (SELECT 1 FROM jsonb_array_elements(\
         CASE WHEN jsonb_typeof(doc->'{key}') = 'array' THEN doc->'{key}' END) e \
         WHERE jsonb_typeof(e) = 'string' AND e #>> '{{}}' ~* ${n}))"
    )
}

/// Render a store query as a SQL predicate over `doc` plus its bound
/// pattern parameters (`$1`, `$2`, ...). Patterns are never inlined.
pub fn where_clause(query: &StoreQuery) -> (String, Vec<String>) {
    fn render(cond: &Condition, params: &mut Vec<String>) -> String {
        match cond {
            Condition::Matches { field, pattern } => {
                params.push(pattern.clone());
                text_match(field.key(), params.len())
            }
            Condition::AnyOf(conds) => {
                let parts: Vec<String> = conds.iter().map(|c| render(c, params)).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }

    if query.is_empty() {
        return ("TRUE".to_string(), Vec::new());
    }
    let mut params = Vec::new();
    let parts: Vec<String> = query.conditions.iter().map(|c| render(c, &mut params)).collect();
    (parts.join(" AND "), params)
}

impl Db {
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        if !valid_table_name(table) {
            return Err(anyhow!("invalid table name {table:?}"));
        }
        let (client, conn) = tokio_postgres::connect(url, NoTls)
            .await
            .context("connect to postgres")?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::error!("postgres connection error: {e}");
            }
        });
        client
            .batch_execute("SET application_name='recon_query';")
            .await?;
        Ok(Self { client, table: table.to_string() })
    }

    pub async fn health_check(&self) -> Result<()> {
        self.client.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn staging_table(&self) -> String {
        format!("{}_staging", self.table)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} (id text PRIMARY KEY, doc jsonb NOT NULL); \
             CREATE UNLOGGED TABLE IF NOT EXISTS {s} (id text NOT NULL, doc text NOT NULL);",
            t = self.table,
            s = self.staging_table(),
        );
        self.client
            .batch_execute(&sql)
            .await
            .with_context(|| format!("create table {}", self.table))
    }

    fn sanitize_field(s: &str) -> String {
        // Strip NUL and escape quotes for CSV; we do not add surrounding quotes here
        let no_nul = s.replace('\u{0}', "");
        no_nul.replace('"', "\"\"")
    }

    async fn with_retry<F, Fut>(&self, mut op: F, label: &str) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let mut delay = Duration::from_millis(250);
        let mut attempts = 0usize;
        let max_attempts = 5usize;
        loop {
            attempts += 1;
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempts < max_attempts => {
                    tracing::warn!("{label} failed (attempt {attempts}): {e}; retrying in {:?}", delay);
                    sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(5));
                }
                Err(e) => return Err(anyhow!("{label} failed after {attempts} attempts: {e}")),
            }
        }
    }

    /// Bulk-load `(id, json)` rows: COPY into the staging table, then upsert
    /// into the main table. Each chunk is retried as a unit.
    pub async fn copy_records(&self, rows: &[(String, String)]) -> Result<()> {
        if rows.is_empty() { return Ok(()); }
        let chunk = 25_000usize;
        let staging = self.staging_table();
        let copy_sql = format!("COPY {staging} (id, doc) FROM STDIN WITH (FORMAT csv)");
        let merge_sql = format!(
            "INSERT INTO {t} (id, doc) SELECT DISTINCT ON (id) id, doc::jsonb FROM {staging} \
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc; TRUNCATE {staging};",
            t = self.table,
        );
        for part in rows.chunks(chunk) {
            self.health_check().await.ok();
            let op = || async {
                self.client.batch_execute(&format!("TRUNCATE {staging};")).await?;
                let sink = self.client.copy_in(copy_sql.as_str()).await?;
                let mut sink = pin!(sink);
                for (id, doc) in part {
                    let line = format!(
                        "\"{}\",\"{}\"\n",
                        Self::sanitize_field(id),
                        Self::sanitize_field(doc),
                    );
                    sink.as_mut().send(Bytes::from(line)).await?;
                }
                sink.as_mut().close().await?;
                self.client.batch_execute(&merge_sql).await?;
                Ok::<(), anyhow::Error>(())
            };
            self.with_retry(op, "COPY scan records").await?;
        }
        Ok(())
    }
}

impl RecordStore for Db {
    async fn find(&self, query: &StoreQuery) -> Result<Vec<Value>> {
        let (predicate, args) = where_clause(query);
        let sql = format!("SELECT doc FROM {} WHERE {} ORDER BY id", self.table, predicate);
        tracing::debug!(%sql, params = ?args, "store query");
        let params: Vec<&(dyn ToSql + Sync)> = args.iter().map(|a| a as &(dyn ToSql + Sync)).collect();
        let rows = self
            .client
            .query(sql.as_str(), &params)
            .await
            .with_context(|| format!("query {}", self.table))?;
        rows.iter()
            .map(|row| row.try_get::<_, Value>(0).context("decode doc column"))
            .collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", self.table);
        let row = self
            .client
            .query_opt(sql.as_str(), &[&id])
            .await
            .with_context(|| format!("fetch {id} from {}", self.table))?;
        row.map(|r| r.try_get::<_, Value>(0).context("decode doc column"))
            .transpose()
    }
}
