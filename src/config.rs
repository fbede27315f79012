use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rules::RuleTable;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub manager: ManagerConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Storage and content locations
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    pub db_path: PathBuf,
    /// Directory holding exported content items (one JSON file per item).
    #[serde(default = "default_content_folder")]
    pub content_folder: PathBuf,
    /// Relationship rule table. The built-in table is used when unset.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Descendant traversal limits
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_depth_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_depth_limit")]
    pub max_limit: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_depth_limit(),
            max_limit: default_max_depth_limit(),
        }
    }
}

/// Reindex queue processing
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Time slice for one processing cycle.
    #[serde(default = "default_cycle_time_secs")]
    pub cycle_time_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between cycles when running as a long-lived worker.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cycle_time_secs: default_cycle_time_secs(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Read API paging
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_authless")]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: default_authless(),
        }
    }
}

fn default_content_folder() -> PathBuf {
    PathBuf::from("content")
}

fn default_depth_limit() -> usize {
    20
}

fn default_max_depth_limit() -> usize {
    100
}

fn default_cycle_time_secs() -> u64 {
    300
}

fn default_batch_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_page_size() -> usize {
    1000
}

fn default_authless() -> bool {
    false
}

fn default_http_enabled() -> bool {
    false
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "DESCENDANT_API_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DESCENDANT_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DESCENDANT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if let Some(rules_path) = &self.manager.rules_path {
            if !rules_path.is_file() {
                anyhow::bail!(
                    "rules_path does not exist or is not a file: {}",
                    rules_path.display()
                );
            }
        }

        if self.traversal.default_limit == 0 {
            anyhow::bail!("traversal.default_limit must be greater than 0");
        }

        if self.traversal.default_limit > self.traversal.max_limit {
            anyhow::bail!("traversal.default_limit must not exceed traversal.max_limit");
        }

        if self.queue.batch_size == 0 {
            anyhow::bail!("queue.batch_size must be greater than 0");
        }

        if self.queue.cycle_time_secs == 0 {
            anyhow::bail!("queue.cycle_time_secs must be greater than 0");
        }

        if self.queue.max_retries == 0 {
            anyhow::bail!("queue.max_retries must be greater than 0");
        }

        if self.api.max_page_size == 0 {
            anyhow::bail!("api.max_page_size must be greater than 0");
        }

        Ok(())
    }

    /// Ensure the content export folder exists (needed by import and watch only).
    pub fn require_content_folder(&self) -> Result<&Path> {
        let folder = &self.manager.content_folder;
        if !folder.is_dir() {
            anyhow::bail!(
                "content_folder is not a directory: {}. Set content_folder in config.toml to your content export directory.",
                folder.display()
            );
        }
        Ok(folder)
    }

    /// Load the relationship rule table: from rules_path when set, built-in otherwise.
    pub fn rules(&self) -> Result<RuleTable> {
        let rules = match &self.manager.rules_path {
            Some(path) => RuleTable::load(path)
                .with_context(|| format!("Failed to load rules: {}", path.display()))?,
            None => RuleTable::builtin().context("Failed to parse built-in rules")?,
        };
        Ok(rules)
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.manager.db_path
    }

    /// Get the content export folder
    pub fn content_folder(&self) -> &Path {
        &self.manager.content_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[manager]
db_path = "./test.db"
"#;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.traversal.default_limit, 20);
        assert_eq!(config.queue.cycle_time_secs, 300);
        assert_eq!(config.api.max_page_size, 1000);
        assert_eq!(config.manager.log_level, "info");
        assert!(config.manager.rules_path.is_none());
        assert!(!config.http_server.authless);
        assert_eq!(config.http_server.port, 8080);
    }

    #[test]
    fn test_config_full() {
        let config = Config::from_toml_str(
            r#"
[manager]
db_path = "./descendants.db"
content_folder = "./export"
log_level = "debug"

[traversal]
default_limit = 10
max_limit = 50

[queue]
cycle_time_secs = 30
batch_size = 5
max_retries = 2
poll_interval_secs = 1

[api]
max_page_size = 200

[http_server]
enabled = true
port = 9090
authless = true
"#,
        )
        .unwrap();
        assert_eq!(config.traversal.default_limit, 10);
        assert_eq!(config.queue.batch_size, 5);
        assert_eq!(config.api.max_page_size, 200);
        assert_eq!(config.http_server.port, 9090);
        assert_eq!(config.content_folder(), Path::new("./export"));
    }

    #[test]
    fn test_config_rejects_zero_limit() {
        let err = Config::from_toml_str(
            r#"
[manager]
db_path = "./test.db"

[traversal]
default_limit = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_limit"));
    }

    #[test]
    fn test_config_rejects_limit_above_max() {
        let err = Config::from_toml_str(
            r#"
[manager]
db_path = "./test.db"

[traversal]
default_limit = 30
max_limit = 10
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_limit"));
    }

    #[test]
    fn test_config_missing_rules_file() {
        let err = Config::from_toml_str(
            r#"
[manager]
db_path = "./test.db"
rules_path = "/nonexistent/relationships.toml"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rules_path"));
    }

    #[test]
    fn test_config_rules_builtin_and_file() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let builtin = config.rules().unwrap();
        assert!(builtin.get("service_page").is_some());

        let temp_dir = TempDir::new().unwrap();
        let rules_path = temp_dir.path().join("rules.toml");
        fs::write(&rules_path, "[article]\nparent = \"field_article_ref_org\"\n").unwrap();
        let rules_str = rules_path.to_str().unwrap().replace('\\', "\\\\");
        let config = Config::from_toml_str(&format!(
            "[manager]\ndb_path = \"./test.db\"\nrules_path = \"{}\"\n",
            rules_str
        ))
        .unwrap();
        let rules = config.rules().unwrap();
        assert!(rules.get("article").is_some());
        assert!(rules.get("service_page").is_none());
    }

    #[test]
    fn test_require_content_folder() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().to_str().unwrap().replace('\\', "\\\\");
        let config = Config::from_toml_str(&format!(
            "[manager]\ndb_path = \"./test.db\"\ncontent_folder = \"{}\"\n",
            folder
        ))
        .unwrap();
        assert!(config.require_content_folder().is_ok());

        let config = Config::from_toml_str(
            "[manager]\ndb_path = \"./test.db\"\ncontent_folder = \"/nonexistent/export\"\n",
        )
        .unwrap();
        assert!(config.require_content_folder().is_err());
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, MINIMAL).unwrap();

        let original = std::env::var("DESCENDANT_CONFIG").ok();
        std::env::set_var("DESCENDANT_CONFIG", config_path.to_str().unwrap());
        let config = Config::load();
        std::env::remove_var("DESCENDANT_CONFIG");
        if let Some(v) = original {
            std::env::set_var("DESCENDANT_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.db_path(), Path::new("./test.db"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("DESCENDANT_CONFIG").ok();
        std::env::set_var("DESCENDANT_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("DESCENDANT_CONFIG");
        if let Some(v) = original {
            std::env::set_var("DESCENDANT_CONFIG", v);
        }
    }
}
