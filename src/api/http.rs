use crate::api::resource::{
    content_metadata, node_descendants, parse_node_id, type_descendants, DescendantQuery,
    MetadataQuery, TypeQuery,
};
use crate::config::Config;
use crate::db::Db;
use crate::error::{DescendantError, Result};
use crate::queue::enqueue;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// HTTP read API over the descendant index
pub struct HttpServer {
    state: AppState,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: Db,
    config: Arc<Config>,
    api_key: String,
}

impl HttpServer {
    /// Create a new HTTP server. Reads the API key from the configured
    /// environment variable unless authless mode is enabled.
    pub fn new(db: Db, config: Config) -> Result<Self> {
        let api_key = if config.http_server.authless {
            String::new()
        } else {
            std::env::var(&config.http_server.api_key_env).map_err(|_| {
                DescendantError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.http_server.api_key_env
                ))
            })?
        };

        Ok(Self {
            state: AppState {
                db,
                config: Arc::new(config),
                api_key,
            },
        })
    }

    /// Serve until the listener fails
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            DescendantError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to bind to {}: {}. Set http_server.port in config.toml to use another port.",
                    addr, e
                ),
            ))
        })?;

        log::info!("Starting HTTP API on http://{}", addr);
        log::info!("Descendants endpoint: http://{}/api/v1/descendants/{{id}}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| {
                DescendantError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;
        Ok(())
    }

    /// Build the axum router
    pub fn router(&self) -> Router {
        let allowed_origins = &self.state.config.http_server.allowed_origins;

        // Preflight answers match the origin check done in handlers
        let cors = if allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/api/v1/descendants", get(handle_type_descendants))
            .route("/api/v1/descendants/:id", get(handle_node_descendants))
            .route("/api/v1/content-metadata", get(handle_content_metadata))
            .route("/api/v1/reindex/:id", post(handle_reindex))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Map a crate error onto a JSON error response
fn error_response(err: DescendantError) -> Response {
    let status = match &err {
        DescendantError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            log::error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = match status {
        StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
        _ => err.to_string(),
    };
    (
        status,
        Json(serde_json::json!({
            "error": message
        })),
    )
        .into_response()
}

/// Auth and origin checks, skipped in authless mode
fn authorize(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), Response> {
    if state.config.http_server.authless {
        return Ok(());
    }
    validate_auth(headers, &state.api_key)?;
    validate_origin(headers, &state.config.http_server.allowed_origins)
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "descendant-manager",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// GET /api/v1/descendants/{id}?format=flat|unique|depth&depth_limit=N
async fn handle_node_descendants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let parsed = parse_node_id(&raw_id)
        .and_then(|id| DescendantQuery::from_params(&params, &state.config.traversal).map(|q| (id, q)));
    let (id, query) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e),
    };

    match state
        .db
        .with_connection(move |conn| node_descendants(conn, id, &query))
        .await
    {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/descendants?content_type=T&format=..&depth_limit=..&limit=..&offset=..
async fn handle_type_descendants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let query = match TypeQuery::from_params(&params, &state.config.traversal, &state.config.api) {
        Ok(query) => query,
        Err(e) => return error_response(e),
    };

    match state
        .db
        .with_connection(move |conn| type_descendants(conn, &query))
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/content-metadata?limit&offset&content_types=a,b&published&descendant_format=depth
async fn handle_content_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let query = match MetadataQuery::from_params(&params, &state.config.api) {
        Ok(query) => query,
        Err(e) => return error_response(e),
    };

    let traversal = state.config.traversal.clone();
    match state
        .db
        .with_connection(move |conn| content_metadata(conn, &query, &traversal))
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/reindex/{id}: queue the item, processed by the worker
async fn handle_reindex(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let id = match parse_node_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    match state.db.with_connection(move |conn| enqueue(conn, id)).await {
        Ok(queue_id) => {
            log::info!("Queued item {} for reindex", id);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "id": id,
                    "queue_id": queue_id,
                    "status": "queued"
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Validate API key from Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let unauthorized = |error: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": error,
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let provided_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization header format"))?;

    if expected_key.is_empty() || provided_key != expected_key {
        return Err(unauthorized("Invalid API key"));
    }
    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Non-browser clients send no Origin
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{save_item, ContentItem, FieldItem};
    use crate::db::open_test_db;
    use crate::graph::reindex_item;
    use crate::queue::queue_stats;
    use crate::rules::RuleTable;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config(extra: &str) -> Config {
        Config::from_toml_str(&format!(
            "[manager]\ndb_path = \"unused.db\"\n\n[http_server]\nauthless = true\n{}",
            extra
        ))
        .unwrap()
    }

    async fn seeded_router(config: Config) -> (Router, Db, tempfile::TempDir) {
        let (db, temp) = open_test_db().await;
        let seed_rules = RuleTable::builtin().unwrap();
        db.with_connection(move |conn| {
            let org = ContentItem::new(5, "org_page").with_title("Department of Revenue");
            let advisory = ContentItem::new(10, "advisory")
                .with_title("Tax advisory")
                .with_field("field_advisory_ref_organization", vec![FieldItem::reference(5)]);
            let draft = ContentItem::new(11, "advisory")
                .unpublished()
                .with_field("field_advisory_ref_organization", vec![FieldItem::reference(5)]);
            for item in [&org, &advisory, &draft] {
                save_item(conn, item, None)?;
                reindex_item(conn, &seed_rules, item.id)?;
            }
            Ok(())
        })
        .await
        .unwrap();

        let server = HttpServer::new(db.clone(), config).unwrap();
        (server.router(), db, temp)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _db, _temp) = seeded_router(test_config("")).await;
        let (status, body) = get_json(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_node_descendants() {
        let (router, _db, _temp) = seeded_router(test_config("")).await;
        let (status, body) = get_json(router.clone(), "/api/v1/descendants/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 5);
        assert_eq!(body["format"], "flat");
        assert_eq!(body["depth_limit"], 20);
        assert_eq!(body["descendants"], serde_json::json!([10, 11]));

        let (_, body) = get_json(router.clone(), "/api/v1/descendants/5?format=depth").await;
        assert_eq!(body["descendants"][0]["id"], 10);
        assert_eq!(body["descendants"][0]["children"], serde_json::json!([]));

        let (status, body) = get_json(router, "/api/v1/descendants/999").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["descendants"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_invalid_params_are_400() {
        let (router, _db, _temp) = seeded_router(test_config("")).await;
        let (status, body) = get_json(router.clone(), "/api/v1/descendants/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid node id"));

        let (status, _) = get_json(router.clone(), "/api/v1/descendants/5?depth_limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(router, "/api/v1/descendants").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_type_descendants() {
        let (router, _db, _temp) = seeded_router(test_config("")).await;
        let (status, body) = get_json(router, "/api/v1/descendants?content_type=org_page").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], 5);
        assert_eq!(body["data"][0]["title"], "Department of Revenue");
        assert_eq!(body["data"][0]["descendants"], serde_json::json!([10, 11]));
        assert_eq!(body["metadata"]["resultset"]["count"], 1);
        assert_eq!(body["metadata"]["resultset"]["limit"], 20);
    }

    #[tokio::test]
    async fn test_content_metadata() {
        let (router, _db, _temp) = seeded_router(test_config("")).await;
        let (status, body) = get_json(
            router.clone(),
            "/api/v1/content-metadata?content_types=advisory&published",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["resultset"]["count"], 1);
        assert_eq!(body["metadata"]["resultset"]["limit"], 1000);
        let row = &body["data"][0];
        assert_eq!(row["id"], 10);
        assert_eq!(row["node_path"], "/node/10");
        assert_eq!(row["content_type"], "advisory");
        assert_eq!(row["published"], true);
        assert_eq!(row["moderation_state"], serde_json::json!([]));

        let (_, body) = get_json(router, "/api/v1/content-metadata?limit=2&offset=1").await;
        let ids: Vec<_> = body["data"].as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![serde_json::json!(10), serde_json::json!(11)]);
        assert_eq!(body["metadata"]["resultset"]["offset"], 1);
    }

    #[tokio::test]
    async fn test_reindex_endpoint_enqueues() {
        let (router, db, _temp) = seeded_router(test_config("")).await;
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/reindex/10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let stats = db.with_connection(|conn| queue_stats(conn)).await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn test_auth_required_when_not_authless() {
        std::env::set_var("DESCENDANT_TEST_HTTP_KEY", "secret");
        let config = Config::from_toml_str(
            "[manager]\ndb_path = \"unused.db\"\n\n[http_server]\napi_key_env = \"DESCENDANT_TEST_HTTP_KEY\"\nallowed_origins = [\"https://edit.mass.gov\"]\n",
        )
        .unwrap();
        let (router, _db, _temp) = seeded_router(config).await;

        let (status, _) = get_json(router.clone(), "/api/v1/descendants/5").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = |auth: &str, origin: &str| {
            Request::builder()
                .uri("/api/v1/descendants/5")
                .header("authorization", auth)
                .header("origin", origin)
                .body(Body::empty())
                .unwrap()
        };

        let response = router
            .clone()
            .oneshot(request("Bearer wrong", "https://edit.mass.gov"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .clone()
            .oneshot(request("Bearer secret", "https://evil.example"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router
            .oneshot(request("Bearer secret", "https://edit.mass.gov"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(DescendantError::InvalidInput("x".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = error_response(DescendantError::Queue("x".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
