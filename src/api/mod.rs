//! HTTP read API: descendant queries, content metadata listing and reindex requests.

pub mod http;
pub mod resource;

pub use http::HttpServer;
