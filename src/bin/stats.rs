use descendant_manager::{config::Config, db::Db, error::DescendantError};
use descendant_manager::graph::edge_count;
use descendant_manager::queue::queue_stats;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());

    println!("\n=== Descendant Manager Statistics ===\n");

    // Content items per type, with how many of them reported edges
    let per_type = db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT
                c.content_type,
                COUNT(*) AS items,
                SUM(CASE WHEN c.published = 1 THEN 1 ELSE 0 END) AS published,
                SUM(CASE WHEN EXISTS (
                    SELECT 1 FROM descendant_relations r WHERE r.reporter = c.id
                ) THEN 1 ELSE 0 END) AS reporting
            FROM content_items c
            GROUP BY c.content_type
            ORDER BY items DESC, c.content_type
            "#
        )?;

        let mut rows = stmt.query([])?;
        let mut results = Vec::new();

        while let Some(row) = rows.next()? {
            results.push((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ));
        }

        Ok::<Vec<_>, DescendantError>(results)
    }).await?;

    if per_type.is_empty() {
        println!("No content items imported yet.");
        println!("\nRun the import binary to load content exports.");
    } else {
        println!("Content Items by Type:\n");
        println!("{:-<62}", "");
        println!("{:<30} {:>10} {:>10} {:>10}", "Content type", "Items", "Published", "Reporting");
        println!("{:-<62}", "");
        for (content_type, items, published, reporting) in &per_type {
            println!("{:<30} {:>10} {:>10} {:>10}", content_type, items, published, reporting);
        }
        println!("{:-<62}", "");
    }

    let (edges, parents, queue) = db.with_connection(|conn| {
        let parents: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT parent) FROM descendant_relations",
            [],
            |row| row.get(0),
        )?;
        Ok((edge_count(conn)?, parents, queue_stats(conn)?))
    }).await?;

    println!("\nRelationship Index:");
    println!("  Edges: {}", edges);
    println!("  Distinct parents: {}", parents);

    println!("\nReindex Queue:");
    println!("  Pending: {}", queue.pending);
    println!("  Retrying: {}", queue.retrying);
    if let Some(oldest) = queue.oldest_enqueued_at {
        println!("  Oldest entry: {}", oldest);
    }

    println!();

    Ok(())
}
