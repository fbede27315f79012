pub mod config;
pub mod error;
pub mod db;
pub mod content;
pub mod rules;
pub mod graph;
pub mod queue;
pub mod ingest;
pub mod watch;
pub mod api;

pub use config::Config;
pub use error::{DescendantError, Result};
pub use graph::{compute_relationships, get_descendants, reindex, DescendantFormat, Descendants};
pub use rules::RuleTable;
