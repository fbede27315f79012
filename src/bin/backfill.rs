//! Queue every published item of a ruled content type for reindexing.

use clap::Parser;
use descendant_manager::Config;
use descendant_manager::db::{Db, migrate};
use descendant_manager::queue::{backfill, process_cycle};
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "backfill")]
#[command(about = "Queue all published items with relationship rules for reindexing")]
struct Args {
    /// Drain the queue after backfilling instead of leaving it to the worker
    #[arg(long)]
    drain: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();
    let config = Config::load()?;
    let rules = Arc::new(config.rules()?);

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir)).await?;

    let queued = backfill(&db, &rules).await?;
    println!("Queued {} items across {} content types", queued, rules.len());

    if args.drain {
        loop {
            let report = process_cycle(&db, Arc::clone(&rules), &config.queue).await?;
            println!(
                "Cycle: {} reindexed, {} failed, {} dropped",
                report.processed, report.failed, report.dropped
            );
            if !report.timed_out {
                break;
            }
        }
    }

    Ok(())
}
