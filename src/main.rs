use anyhow::{Context, Result};
use salesloader::{clean, config::Config, sink, source::CsvBatchReader};
use sqlx::PgPool;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) resolve configuration ────────────────────────────────────
    dotenvy::dotenv().ok();
    let cfg = Config::load().context("loading configuration")?;
    info!(
        source = %cfg.source_path.display(),
        table = %cfg.table_name,
        batch_size = cfg.batch_size,
        "startup"
    );

    // ─── 3) open the source before touching the database ─────────────
    // A missing file must terminate the run without a connection attempt.
    let reader = CsvBatchReader::open(&cfg.source_path, cfg.batch_size)
        .with_context(|| format!("opening source file {}", cfg.source_path.display()))?;

    // ─── 4) connect once, release on every exit path ─────────────────
    info!("connecting to destination and starting import");
    let pool = sink::connect(&cfg.connection_string)
        .await
        .context("connecting to destination database")?;

    let result = load(reader, &pool, &cfg).await;
    pool.close().await;
    let total = result?;

    println!("Total rows now in '{}': {}", cfg.table_name, total);
    Ok(())
}

/// Drive the whole pass: read → clean → write per batch, then the final
/// count. Kept separate from `main` so the pool closes no matter how this
/// returns.
async fn load(reader: CsvBatchReader, pool: &PgPool, cfg: &Config) -> Result<i64> {
    let start = Instant::now();
    let mut batch_index = 0usize;

    for batch in reader {
        let batch = batch.with_context(|| format!("reading batch {}", batch_index + 1))?;
        batch_index += 1;

        let cleaned = clean::clean_batch(&batch)
            .with_context(|| format!("cleaning batch {}", batch_index))?;

        // first batch replaces the table, the rest append
        if batch_index == 1 {
            sink::replace_table(pool, &cfg.table_name, &cleaned.schema())
                .await
                .context("replacing destination table")?;
        }
        let rows = sink::append_batch(pool, &cfg.table_name, &cleaned)
            .await
            .with_context(|| format!("writing batch {}", batch_index))?;
        info!(batch = batch_index, rows, "loaded batch");
    }
    info!(batches = batch_index, elapsed = ?start.elapsed(), "import complete");

    sink::count_rows(pool, &cfg.table_name)
        .await
        .context("counting destination rows")
}
