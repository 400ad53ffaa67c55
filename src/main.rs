use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use recon_query::db::Db;
use recon_query::{Engine, ListParams, MemoryStore, RecordStore};

#[derive(Parser, Debug, Clone)]
#[command(about = "List and inspect reconnaissance scan records")]
struct Args {
    /// Postgres connection string (postgres://...) - not required with --input
    #[arg(long, env = "DATABASE_URL", global = true)]
    db_url: Option<String>,
    /// Table holding the scan records
    #[arg(long, env = "RECON_TABLE", default_value = "scan_records", global = true)]
    table: String,
    /// Serve records from an NDJSON file (.json or .json.zst) instead of Postgres
    #[arg(long, global = true)]
    input: Option<String>,
    /// Pretty-print JSON output
    #[arg(long, default_value_t = false, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Filter, sort and paginate records
    List {
        /// Page number, 1-based (malformed values fall back to 1)
        #[arg(long)]
        page: Option<String>,
        /// Records per page (malformed values fall back to 100)
        #[arg(long)]
        limit: Option<String>,
        /// Search query, e.g. "ip:10.0.0 AND port>=8000"
        #[arg(long)]
        search: Option<String>,
        /// ip | domain | tools | ports
        #[arg(long)]
        sort_by: Option<String>,
        /// asc | desc
        #[arg(long)]
        sort_order: Option<String>,
    },
    /// Print a single record by id
    Show { id: String },
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

async fn execute<S: RecordStore>(engine: Engine<S>, command: Command, pretty: bool) -> Result<ExitCode> {
    match command {
        Command::List { page, limit, search, sort_by, sort_order } => {
            let params = ListParams::from_raw(
                page.as_deref(),
                limit.as_deref(),
                search.as_deref(),
                sort_by.as_deref(),
                sort_order.as_deref(),
            );
            let resp = engine.list(&params).await?;
            print_json(&resp, pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id } => match engine.get(&id).await? {
            Some(record) => {
                print_json(&record, pretty)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Record not found: {id}");
                Ok(ExitCode::from(1))
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = if let Some(path) = &args.input {
        let store = MemoryStore::from_path(path).with_context(|| format!("load {}", path))?;
        execute(Engine::new(store), args.command, args.pretty).await
    } else {
        let url = args
            .db_url
            .as_ref()
            .ok_or_else(|| anyhow!("Database URL required when not using --input"))?;
        let db = Db::connect(url, &args.table).await?;
        execute(Engine::new(db), args.command, args.pretty).await
    };
    if let Err(e) = &result {
        tracing::error!("request failed: {e:#}");
    }
    result
}
