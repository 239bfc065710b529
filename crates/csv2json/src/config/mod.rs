//! Service configuration.
//!
//! Two sources feed one shape: the legacy single-route environment block,
//! or (when `ROUTES_CONFIG` is set) a JSON routes file. Both normalize into
//! `Vec<RouteConfig>` so the supervisor has a single input form. Broker
//! connection settings always come from the environment.

pub mod routes;

use crate::error::{IngestError, Result};
use crate::monitor::WatchMode;
use crate::output::OutputMode;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VALID_QUEUE_TYPES: [&str; 4] = ["rabbitmq", "kafka", "sqs", "azure-servicebus"];

/// Broker connection settings, shared by every queue-enabled route.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl QueueSettings {
    pub fn from_env() -> Result<Self> {
        let port_raw = get_env("QUEUE_PORT", "5672");
        let port: u16 = port_raw.parse().map_err(|_| {
            IngestError::Config(format!(
                "QUEUE_PORT must be between 1 and 65535, got: {}",
                port_raw
            ))
        })?;
        if port == 0 {
            return Err(IngestError::Config(
                "QUEUE_PORT must be between 1 and 65535, got: 0".to_string(),
            ));
        }
        Ok(Self {
            kind: get_env("QUEUE_TYPE", "rabbitmq"),
            host: get_env("QUEUE_HOST", "localhost"),
            port,
            username: get_env("QUEUE_USERNAME", ""),
            password: get_env("QUEUE_PASSWORD", ""),
        })
    }
}

/// Process-wide logging settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
    pub queue_messages: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        let file = get_env("LOG_FILE", "");
        Self {
            level: get_env("LOG_LEVEL", "INFO"),
            file: if file.is_empty() {
                None
            } else {
                Some(PathBuf::from(file))
            },
            queue_messages: get_bool_env("LOG_QUEUE_MESSAGES", false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputSettings {
    pub path: PathBuf,
    pub watch_mode: WatchMode,
    pub poll_interval: Duration,
    pub hybrid_poll_interval: Duration,
    pub max_files_per_poll: usize,
    /// Empty = match all.
    pub filename_pattern: String,
    /// Empty = match all.
    pub suffix_filter: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParsingSettings {
    pub delimiter: u8,
    pub quote_char: u8,
    pub encoding: String,
    pub has_header: bool,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub mode: OutputMode,
    pub folder: Option<PathBuf>,
    pub queue_name: Option<String>,
    pub include_envelope: bool,
}

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub processed: PathBuf,
    pub ignored: PathBuf,
    pub failed: PathBuf,
    pub add_timestamp: bool,
}

/// One ingestion route: immutable after load.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub name: String,
    pub ingestion_contract: String,
    pub input: InputSettings,
    pub parsing: ParsingSettings,
    pub output: OutputSettings,
    pub archive: ArchiveSettings,
}

/// Everything the supervisor needs to run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub routes: Vec<RouteConfig>,
    pub queue: QueueSettings,
    pub logging: LogSettings,
    pub multi_route: bool,
}

/// Load configuration from the environment, switching to multi-route mode
/// when `ROUTES_CONFIG` is set.
pub fn load() -> Result<Settings> {
    let queue = QueueSettings::from_env()?;
    let logging = LogSettings::from_env();

    let routes_path = get_env("ROUTES_CONFIG", "");
    if routes_path.is_empty() {
        let route = legacy_route(&queue)?;
        return Ok(Settings {
            routes: vec![route],
            queue,
            logging,
            multi_route: false,
        });
    }

    let routes = routes::load_routes(Path::new(&routes_path))?;
    if routes.is_empty() {
        return Err(IngestError::Config(format!(
            "no routes configured in {}",
            routes_path
        )));
    }
    Ok(Settings {
        routes,
        queue,
        logging,
        multi_route: true,
    })
}

/// Build the single `default` route from the legacy environment block.
fn legacy_route(queue: &QueueSettings) -> Result<RouteConfig> {
    let input_folder = PathBuf::from(get_env("INPUT_FOLDER", "./input"));
    let watch_mode: WatchMode = get_env("WATCH_MODE", "event").parse()?;

    let poll_secs = get_u64_env("POLL_INTERVAL_SECONDS", 5);
    if poll_secs < 1 {
        return Err(IngestError::Config(
            "POLL_INTERVAL_SECONDS must be >= 1".to_string(),
        ));
    }
    let hybrid_secs = get_u64_env("HYBRID_POLL_INTERVAL_SECONDS", 60);

    let pattern = get_env("FILENAME_PATTERN", ".*");
    Regex::new(&pattern)
        .map_err(|e| IngestError::Config(format!("invalid FILENAME_PATTERN: {}", e)))?;

    let mode: OutputMode = get_env("OUTPUT_TYPE", "file").parse()?;
    let output_folder = PathBuf::from(get_env("OUTPUT_FOLDER", "./output"));
    let queue_name = get_env("QUEUE_NAME", "");

    if matches!(mode, OutputMode::Queue | OutputMode::Both) {
        if queue.kind.is_empty() || queue.host.is_empty() || queue_name.is_empty() {
            return Err(IngestError::Config(
                "QUEUE_TYPE, QUEUE_HOST, and QUEUE_NAME must be set when OUTPUT_TYPE=queue"
                    .to_string(),
            ));
        }
        validate_queue_type(&queue.kind)?;
    }

    let encoding = get_env("ENCODING", "utf-8");
    validate_encoding(&encoding)?;

    let archive = ArchiveSettings {
        processed: PathBuf::from(get_env("ARCHIVE_PROCESSED", "./archive/processed")),
        ignored: PathBuf::from(get_env("ARCHIVE_IGNORED", "./archive/ignored")),
        failed: PathBuf::from(get_env("ARCHIVE_FAILED", "./archive/failed")),
        add_timestamp: get_bool_env("ARCHIVE_TIMESTAMP", true),
    };

    let route = RouteConfig {
        name: "default".to_string(),
        ingestion_contract: String::new(),
        input: InputSettings {
            path: input_folder,
            watch_mode,
            poll_interval: Duration::from_secs(poll_secs),
            hybrid_poll_interval: Duration::from_secs(hybrid_secs),
            max_files_per_poll: get_usize_env("MAX_FILES_PER_POLL", 0),
            filename_pattern: pattern,
            suffix_filter: parse_suffix_filter(&get_env("FILE_SUFFIX_FILTER", "")),
        },
        parsing: ParsingSettings {
            delimiter: first_byte(&get_env("DELIMITER", ","), "DELIMITER")?,
            quote_char: first_byte(&get_env("QUOTECHAR", "\""), "QUOTECHAR")?,
            encoding,
            has_header: get_bool_env("HAS_HEADER", true),
        },
        output: OutputSettings {
            mode,
            folder: Some(output_folder.clone()),
            queue_name: if queue_name.is_empty() {
                None
            } else {
                Some(queue_name)
            },
            // Legacy single-route messages keep the {identifier, data} shape.
            include_envelope: false,
        },
        archive,
    };

    let mut dirs = vec![route.input.path.clone()];
    if matches!(mode, OutputMode::File | OutputMode::Both) {
        dirs.push(output_folder);
    }
    dirs.extend([
        route.archive.processed.clone(),
        route.archive.ignored.clone(),
        route.archive.failed.clone(),
    ]);
    for dir in dirs {
        fs::create_dir_all(&dir).map_err(|e| {
            IngestError::Config(format!(
                "failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    Ok(route)
}

pub(crate) fn validate_queue_type(kind: &str) -> Result<()> {
    if VALID_QUEUE_TYPES.contains(&kind) {
        return Ok(());
    }
    Err(IngestError::Config(format!(
        "QUEUE_TYPE must be one of: rabbitmq, kafka, sqs, azure-servicebus, got: {}",
        kind
    )))
}

pub(crate) fn validate_encoding(encoding: &str) -> Result<()> {
    if encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8") {
        return Ok(());
    }
    Err(IngestError::Config(format!(
        "unsupported encoding: {} (only utf-8 is supported)",
        encoding
    )))
}

/// Comma list of suffixes; empty or `*` matches everything. A missing
/// leading dot is added so `csv` and `.csv` behave the same.
pub(crate) fn parse_suffix_filter(raw: &str) -> Vec<String> {
    if raw.is_empty() || raw == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('.') {
                s.to_string()
            } else {
                format!(".{}", s)
            }
        })
        .collect()
}

pub(crate) fn first_byte(value: &str, key: &str) -> Result<u8> {
    value
        .bytes()
        .next()
        .ok_or_else(|| IngestError::Config(format!("{} must not be empty", key)))
}

pub(crate) fn get_env(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

pub(crate) fn get_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.parse().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn get_u64_env(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.parse().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn get_usize_env(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.parse().unwrap_or(default),
        _ => default,
    }
}
