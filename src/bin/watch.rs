//! Watch content_folder for export changes; re-import changed files and queue affected items.

use clap::Parser;
use descendant_manager::watch::run_watcher;
use descendant_manager::{Config, db::Db, db::migrate};
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Watch content_folder for changes and auto re-import")]
struct Args {
    /// Debounce delay in milliseconds before processing a file change
    #[arg(long, default_value = "500")]
    debounce_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    log::info!("Starting content folder watcher");
    let config = Config::load()?;
    let content_folder = config.require_content_folder()?.to_path_buf();
    log::info!("Content folder: {}", content_folder.display());
    log::info!("Debounce: {} ms", args.debounce_ms);

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir)).await?;

    log::info!("Watching for changes (Ctrl+C to stop)");
    run_watcher(db, content_folder, args.debounce_ms).await?;
    Ok(())
}
