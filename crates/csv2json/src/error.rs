//! Error types for the ingestion engine.

use std::io;
use thiserror::Error;

/// Engine error type.
///
/// Per-file errors (`Structural`, `Sink`) are collapsed into archive
/// outcomes by the route processor and never escape a route. `Config` and
/// `NotImplemented` are fatal at startup.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Structural(String),

    #[error("{0}")]
    Sink(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("{0} not yet implemented")]
    NotImplemented(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, IngestError>;
