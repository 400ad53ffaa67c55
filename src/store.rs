use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::fs::File;
use std::future::Future;
use std::io::{BufRead, BufReader};
use zstd::stream::Decoder;

use crate::filter::{Condition, StoreQuery};
use crate::types::record_id;

/// Source of scan records. `find` returns every record matching the
/// conjunctive query; the engine materializes the whole result before
/// paginating, so a cursor-based store can slot in here later.
pub trait RecordStore {
    fn find(&self, query: &StoreQuery) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn find_by_id(&self, id: &str) -> impl Future<Output = Result<Option<Value>>> + Send;
}

/// Open an NDJSON file, transparently decompressing `.zst`.
pub fn open_ndjson(path: &str) -> Result<Box<dyn BufRead + Send>> {
    let f = File::open(path).with_context(|| format!("open {}", path))?;
    if path.ends_with(".zst") {
        let dec = Decoder::new(f).with_context(|| format!("zstd decoder for {}", path))?;
        Ok(Box::new(BufReader::new(dec)))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

enum Compiled {
    Matches { key: &'static str, re: Regex },
    AnyOf(Vec<Compiled>),
}

fn compile(cond: &Condition) -> Result<Compiled> {
    Ok(match cond {
        Condition::Matches { field, pattern } => {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid pattern for {}: {:?}", field.key(), pattern))?;
            Compiled::Matches { key: field.key(), re }
        }
        Condition::AnyOf(conds) => Compiled::AnyOf(conds.iter().map(compile).collect::<Result<_>>()?),
    })
}

impl Compiled {
    fn is_match(&self, record: &Value) -> bool {
        match self {
            Compiled::Matches { key, re } => match record.get(*key) {
                Some(Value::String(s)) => re.is_match(s),
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|v| v.as_str().is_some_and(|s| re.is_match(s))),
                _ => false,
            },
            Compiled::AnyOf(conds) => conds.iter().any(|c| c.is_match(record)),
        }
    }
}

/// Records held in memory, in load order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<Value>,
}

impl MemoryStore {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Load one record per line. Blank lines are skipped; lines that are not
    /// JSON objects are skipped with a warning.
    pub fn from_path(path: &str) -> Result<Self> {
        let reader = open_ndjson(path)?;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (n, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read {} line {}", path, n + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(v) if v.is_object() => records.push(v),
                _ => {
                    skipped += 1;
                    tracing::warn!(path, line = n + 1, "skipping line that is not a JSON object");
                }
            }
        }
        tracing::debug!(path, loaded = records.len(), skipped, "loaded records");
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    async fn find(&self, query: &StoreQuery) -> Result<Vec<Value>> {
        let compiled = query.conditions.iter().map(compile).collect::<Result<Vec<_>>>()?;
        Ok(self
            .records
            .iter()
            .filter(|r| compiled.iter().all(|c| c.is_match(r)))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Value>> {
        Ok(self
            .records
            .iter()
            .find(|r| record_id(r).as_deref() == Some(id))
            .cloned())
    }
}
