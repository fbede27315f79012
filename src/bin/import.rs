//! Import CMS content exports from content_folder and queue them for reindexing.

use clap::Parser;
use descendant_manager::Config;
use descendant_manager::db::{Db, migrate};
use descendant_manager::ingest::{
    discover_exports, import_file, get_existing_hashes, classify_files, find_deleted_sources,
    delete_sources,
};
use std::path::Path;
use std::collections::HashSet;
use std::time::Instant;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Import content exports into the Descendant Manager database (incremental by default)")]
struct Args {
    /// Force re-import of all exports (ignore hashes)
    #[arg(short, long)]
    force: bool,

    /// Delete items whose export file no longer exists
    #[arg(short, long)]
    cleanup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    log::info!("Starting content import");

    let config = Config::load()?;
    let content_folder = config.require_content_folder()?.to_path_buf();
    log::info!("Content folder: {}", content_folder.display());
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    let files = discover_exports(&content_folder)?;
    log::info!("Found {} export files", files.len());

    let existing_hashes = get_existing_hashes(&db).await?;
    let classification = classify_files(&files, &existing_hashes)?;

    let num_new = classification.new_files.len();
    let num_modified = classification.modified_files.len();
    let num_unchanged = classification.unchanged_files.len();

    let to_import = if args.force {
        log::info!("Mode: full re-import (all files)");
        files.clone()
    } else {
        log::info!("Classification: new={}, modified={}, unchanged (skip)={}",
            num_new, num_modified, num_unchanged,
        );
        classification.changed()
    };

    let start = Instant::now();
    let total = to_import.len();
    let mut imported = 0usize;
    let mut queued = 0usize;
    let mut errors = 0usize;

    for (idx, file) in to_import.iter().enumerate() {
        match import_file(&db, file).await {
            Ok(outcome) => {
                imported += 1;
                queued += 1 + outcome.displaced.len();
                log::debug!(
                    "[{}/{}] {} -> item {} ({})",
                    idx + 1,
                    total,
                    file.relative_path,
                    outcome.item_id,
                    outcome.content_type
                );
                if !outcome.displaced.is_empty() {
                    log::info!("{} replaced items {:?}", file.relative_path, outcome.displaced);
                }
            }
            Err(e) => {
                errors += 1;
                log::error!("✗ {}: {}", file.relative_path, e);
            }
        }
    }

    let existing_paths: HashSet<String> = files.iter().map(|f| f.relative_path.clone()).collect();
    let deleted = find_deleted_sources(&db, &existing_paths).await?;
    let deleted_count = if !deleted.is_empty() && args.cleanup {
        let ids = delete_sources(&db, &deleted).await?;
        queued += ids.len();
        ids.len()
    } else {
        if !deleted.is_empty() {
            log::info!("Found {} items whose export no longer exists (use --cleanup to remove)", deleted.len());
        }
        0
    };

    log::info!("=== Import Complete ===");
    log::info!("Files discovered: {}", files.len());
    log::info!("  New: {}", num_new);
    log::info!("  Modified: {}", num_modified);
    log::info!("  Unchanged (skipped): {}", num_unchanged);
    log::info!("Items imported: {} (errors: {})", imported, errors);
    log::info!("Items deleted: {}", deleted_count);
    log::info!("Reindex requests queued: {}", queued);
    log::info!("Time: {:?}", start.elapsed());

    if errors > 0 {
        log::warn!("Some exports failed to import. Check logs above for details.");
    }

    Ok(())
}
