use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::io::BufRead;
use std::time::Instant;

use crate::db::Db;
use crate::store::open_ndjson;
use crate::types::record_id;

pub struct Config {
    pub path: String,
    pub batch_size: usize,
    pub db_url: Option<String>,
    pub table: String,
    pub dry_run: bool,
}

/// Why a line was not loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    Blank,
    InvalidJson,
    NotAnObject,
}

/// A record ready for the store: its id and serialized document.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub id: String,
    pub doc: String,
    pub sanitization_fixes: usize,
}

fn sanitize_value(v: &mut Value, fixes: &mut usize) {
    match v {
        Value::String(s) => {
            if s.contains('\u{0}') {
                *fixes += 1;
                *s = s.replace('\u{0}', "");
            }
        }
        Value::Array(arr) => {
            for elem in arr.iter_mut() {
                sanitize_value(elem, fixes)
            }
        }
        Value::Object(map) => {
            for (_, val) in map.iter_mut() {
                sanitize_value(val, fixes)
            }
        }
        _ => {}
    }
}

/// Parse one NDJSON line into a storable record. NULs are stripped from
/// strings (jsonb rejects them). Records without an `_id` get one derived
/// from a BLAKE3 hash of their content.
pub fn prepare_record(line: &str) -> std::result::Result<Prepared, Rejected> {
    if line.trim().is_empty() {
        return Err(Rejected::Blank);
    }
    let mut v: Value = serde_json::from_str(line).map_err(|_| Rejected::InvalidJson)?;
    if !v.is_object() {
        return Err(Rejected::NotAnObject);
    }
    let mut sanitization_fixes = 0usize;
    sanitize_value(&mut v, &mut sanitization_fixes);

    let id = match record_id(&v) {
        Some(id) => id,
        None => {
            let hex = blake3::hash(v.to_string().as_bytes()).to_hex();
            let id = hex.as_str()[..24].to_string();
            if let Some(obj) = v.as_object_mut() {
                obj.insert("_id".to_string(), Value::String(id.clone()));
            }
            id
        }
    };
    Ok(Prepared { id, doc: v.to_string(), sanitization_fixes })
}

/// Per-run line accounting, returned by [`run`].
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub loaded: usize,
    pub blank: usize,
    pub invalid_json: usize,
    pub not_object: usize,
    /// Lines whose id repeated an earlier line in the same batch.
    pub duplicates: usize,
    pub sanitization_fixes: usize,
    pub flushed: usize,
}

impl Stats {
    fn reject(&mut self, why: Rejected) {
        match why {
            Rejected::Blank => self.blank += 1,
            Rejected::InvalidJson => self.invalid_json += 1,
            Rejected::NotAnObject => self.not_object += 1,
        }
    }
}

// Preallocation ceiling; larger batches grow on demand.
const MAX_PREALLOC: usize = 65_536;

struct Batcher {
    rows: Vec<(String, String)>, // (id, doc_json)
    index: HashMap<String, usize>,
    cap: usize,
}

impl Batcher {
    fn new(cap: usize) -> Self {
        Self { rows: Vec::with_capacity(cap.min(MAX_PREALLOC)), index: HashMap::new(), cap }
    }

    /// Queue a row. A repeated id within the batch replaces the earlier row,
    /// so the last line wins. Returns true when a row was replaced.
    fn push(&mut self, id: String, doc: String) -> bool {
        if let Some(&i) = self.index.get(&id) {
            self.rows[i].1 = doc;
            return true;
        }
        self.index.insert(id.clone(), self.rows.len());
        self.rows.push((id, doc));
        false
    }

    fn should_flush(&self) -> bool {
        self.rows.len() >= self.cap
    }

    async fn flush(&mut self, db: &Db) -> Result<usize> {
        if self.rows.is_empty() {
            return Ok(0);
        }
        let rows = std::mem::take(&mut self.rows);
        self.index.clear();
        db.copy_records(&rows).await?;
        Ok(rows.len())
    }

    fn dry_flush(&mut self) -> usize {
        let n = self.rows.len();
        if n > 0 {
            let (id, doc) = &self.rows[0];
            let preview: String = doc.chars().take(120).collect();
            tracing::info!(rows = n, sample_id = %id, sample = %preview, "dry-run flush");
        }
        self.rows.clear();
        self.index.clear();
        n
    }
}

pub async fn run(cfg: Config) -> Result<Stats> {
    let started_at = Instant::now();
    let wall_start: DateTime<Utc> = Utc::now();
    let db = if cfg.dry_run {
        None
    } else {
        let url = cfg
            .db_url
            .as_ref()
            .ok_or_else(|| anyhow!("Database URL required unless running with --dry-run"))?;
        let db = Db::connect(url, &cfg.table).await?;
        db.ensure_schema().await?;
        Some(db)
    };

    let reader = open_ndjson(&cfg.path)?;
    let mut batcher = Batcher::new(cfg.batch_size.max(1));
    let mut stats = Stats::default();

    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {} line {}", cfg.path, n + 1))?;
        match prepare_record(&line) {
            Ok(p) => {
                stats.loaded += 1;
                stats.sanitization_fixes += p.sanitization_fixes;
                if batcher.push(p.id, p.doc) {
                    stats.duplicates += 1;
                }
            }
            Err(why) => {
                if why != Rejected::Blank {
                    tracing::debug!(line = n + 1, ?why, "skipping line");
                }
                stats.reject(why);
            }
        }
        if batcher.should_flush() {
            stats.flushed += match &db {
                Some(db) => batcher.flush(db).await?,
                None => batcher.dry_flush(),
            };
            tracing::info!(loaded = stats.loaded, flushed = stats.flushed, "ingest progress");
        }
    }
    stats.flushed += match &db {
        Some(db) => batcher.flush(db).await?,
        None => batcher.dry_flush(),
    };

    tracing::info!(
        loaded = stats.loaded,
        flushed = stats.flushed,
        duplicates = stats.duplicates,
        blank = stats.blank,
        invalid_json = stats.invalid_json,
        not_object = stats.not_object,
        sanitization_fixes = stats.sanitization_fixes,
        dry_run = cfg.dry_run,
        elapsed_secs = started_at.elapsed().as_secs_f64(),
        started_at = %wall_start.to_rfc3339(),
        completed_at = %Utc::now().to_rfc3339(),
        "ingestion complete"
    );
    Ok(stats)
}
