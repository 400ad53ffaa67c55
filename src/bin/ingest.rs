use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use recon_query::ingest;

#[derive(Parser, Debug, Clone)]
#[command(about = "Load NDJSON scan records into Postgres")]
struct Args {
    /// Path to NDJSON input (.json or .json.zst), one record per line
    #[arg(long)]
    input: String,
    /// Postgres connection string (postgres://...) - not required for --dry-run
    #[arg(long, env = "DATABASE_URL")]
    db_url: Option<String>,
    /// Target table
    #[arg(long, env = "RECON_TABLE", default_value = "scan_records")]
    table: String,
    /// Batch size (rows per COPY)
    #[arg(long, default_value_t = 10000)]
    batch: usize,
    /// Dry run: parse and count only (no DB writes)
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    ingest::run(ingest::Config {
        path: args.input,
        batch_size: args.batch,
        db_url: args.db_url,
        table: args.table,
        dry_run: args.dry_run,
    })
    .await?;
    Ok(())
}
