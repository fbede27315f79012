use descendant_manager::api::HttpServer;
use descendant_manager::db::{Db, migrate};
use descendant_manager::queue::{process_cycle, queue_stats};
use descendant_manager::{Config, DescendantError, RuleTable};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.manager.log_level.as_str())
    ).init();

    match command {
        "serve" => {
            // HTTP read API plus the queue worker
            run_http_server(config).await?;
        }
        "worker" => {
            run_worker(config).await?;
        }
        "verify" | _ => {
            // Default: verify database schema
            run_schema_verification(config).await?;
        }
    }

    Ok(())
}

/// Open the database and bring its schema up to date.
async fn open_database(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;
    log::info!("Database initialized: {}", config.db_path().display());
    Ok(db)
}

/// Run the HTTP server, with the queue worker in the background
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting Descendant Manager HTTP Server v{}", env!("CARGO_PKG_VERSION"));

    if !config.http_server.enabled {
        anyhow::bail!("http_server.enabled is false in config.toml; use `worker` to run the queue only");
    }

    let db = open_database(&config).await?;
    let rules = Arc::new(config.rules()?);
    log::info!("Loaded relationship rules for {} content types", rules.len());

    let worker = tokio::spawn(worker_loop(db.clone(), rules, config.clone()));

    let server = HttpServer::new(db, config.clone())?;
    let result = server.run(config.http_server.port).await;
    worker.abort();
    result?;

    Ok(())
}

/// Run the queue worker until Ctrl+C
async fn run_worker(config: Config) -> Result<()> {
    log::info!("Starting Descendant Manager queue worker v{}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&config).await?;
    let rules = Arc::new(config.rules()?);
    log::info!("Loaded relationship rules for {} content types", rules.len());

    tokio::select! {
        _ = worker_loop(db, rules, config) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down queue worker");
        }
    }

    Ok(())
}

/// Process the queue once per poll interval, forever.
///
/// A failed cycle is logged and retried on the next tick.
async fn worker_loop(db: Db, rules: Arc<RuleTable>, config: Config) {
    let poll = Duration::from_secs(config.queue.poll_interval_secs.max(1));
    loop {
        match process_cycle(&db, Arc::clone(&rules), &config.queue).await {
            Ok(report) if report.timed_out => {
                // More work is waiting; start the next cycle right away
                continue;
            }
            Ok(_) => {}
            Err(e) => log::error!("Queue cycle failed: {}", e),
        }
        tokio::time::sleep(poll).await;
    }
}

/// Run database schema verification
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting Descendant Manager v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration loaded successfully");
    log::info!("Content folder: {}", config.content_folder().display());
    log::info!("Database path: {}", config.db_path().display());

    let rules = config.rules()?;
    log::info!("Relationship rules: {} content types", rules.len());

    let db = open_database(&config).await?;

    // Verify schema
    verify_database_schema(&db).await?;

    let stats = db.with_connection(|conn| queue_stats(conn)).await?;
    log::info!("Queue: {} pending, {} retrying", stats.pending, stats.retrying);

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        // Check tables
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["content_items", "descendant_queue", "descendant_relations", "schema_migrations"];
        let missing: Vec<&str> = expected_tables
            .iter()
            .copied()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(DescendantError::Config("Not all required tables exist".to_string()));
        }

        // Check migrations
        let applied = migrate::get_applied_migrations(conn)?;
        if applied.len() < 3 {
            return Err(DescendantError::Config(format!("Expected at least 3 migrations, found {}", applied.len())));
        }
        log::debug!("{} migrations applied", applied.len());

        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_indexes = [
            "idx_content_items_type_published",
            "idx_descendant_relations_parent",
            "idx_descendant_relations_reporter",
            "idx_descendant_queue_item",
        ];
        for index_name in &expected_indexes {
            if !indexes.iter().any(|i| i == index_name) {
                log::warn!("Index not found: {}", index_name);
            }
        }

        // Check pragmas
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(DescendantError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        // Integrity check
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(DescendantError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("Database schema verification complete");
    Ok(())
}
