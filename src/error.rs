use thiserror::Error;

/// Main error type for the descendant manager
#[derive(Error, Debug)]
pub enum DescendantError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (including relationship rule files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization of stored or imported content
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reindex queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Background task failed to complete
    #[error("Task error: {0}")]
    Task(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using DescendantError
pub type Result<T> = std::result::Result<T, DescendantError>;
