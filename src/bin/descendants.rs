//! Print the descendants of an item, or of every published item of a content type.

use clap::Parser;
use descendant_manager::content::{find_item_ids, load_items, ContentFilter, NodeId};
use std::collections::HashMap;
use descendant_manager::db::Db;
use descendant_manager::graph::{get_descendants, DescendantNode};
use descendant_manager::{Config, DescendantFormat, Descendants};
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "descendants")]
#[command(about = "Query the descendant index")]
struct Args {
    /// Item id to start from
    #[arg(required_unless_present = "content_type")]
    id: Option<NodeId>,

    /// Query every published item of this content type instead
    #[arg(long, conflicts_with = "id")]
    content_type: Option<String>,

    /// Result shape: flat, unique or depth
    #[arg(short, long, default_value = "flat")]
    format: DescendantFormat,

    /// Traversal budget (defaults to traversal.default_limit)
    #[arg(short, long)]
    depth_limit: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

fn print_tree(nodes: &[DescendantNode], indent: usize) {
    for node in nodes {
        println!("{:indent$}{}", "", node.id, indent = indent * 2);
        print_tree(&node.children, indent + 1);
    }
}

fn print_result(id: NodeId, title: Option<&str>, descendants: &Descendants, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({ "id": id, "title": title, "descendants": descendants });
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }
    let label = match title {
        Some(title) => format!("{} ({})", id, title),
        None => id.to_string(),
    };
    match descendants {
        Descendants::Flat(ids) => {
            let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            println!("{}: [{}]", label, ids.join(", "));
        }
        Descendants::Nested(nodes) => {
            println!("{}", label);
            print_tree(nodes, 1);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "warn"),
    )
    .init();

    let args = Args::parse();
    let config = Config::load()?;

    let limit = args.depth_limit.unwrap_or(config.traversal.default_limit);
    if limit == 0 || limit > config.traversal.max_limit {
        anyhow::bail!(
            "--depth-limit must be between 1 and {}",
            config.traversal.max_limit
        );
    }

    let db = Db::new(config.db_path());
    let format = args.format;
    let start_ids = match (args.id, args.content_type) {
        (Some(id), _) => vec![id],
        (None, Some(content_type)) => {
            let filter = ContentFilter::published_of_types([content_type]);
            db.with_connection(move |conn| find_item_ids(conn, &filter)).await?
        }
        (None, None) => anyhow::bail!("either an id or --content-type is required"),
    };

    let (titles, results) = db
        .with_connection(move |conn| {
            // Start ids may have edges without an imported item; those print untitled
            let titles: HashMap<NodeId, String> = load_items(conn, &start_ids)?
                .into_iter()
                .map(|item| (item.id, item.title))
                .collect();
            let results = start_ids
                .into_iter()
                .map(|id| Ok((id, get_descendants(conn, id, format, limit)?)))
                .collect::<descendant_manager::Result<Vec<_>>>()?;
            Ok((titles, results))
        })
        .await?;

    for (id, descendants) in &results {
        print_result(*id, titles.get(id).map(String::as_str), descendants, args.json)?;
    }

    Ok(())
}
