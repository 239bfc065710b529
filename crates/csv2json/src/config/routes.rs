//! Multi-route configuration file.
//!
//! `ROUTES_CONFIG` points at a JSON document whose root object carries a
//! `routes` array. Keys are camelCase; unspecified fields fall back to the
//! legacy environment defaults.

use super::{
    first_byte, get_env, parse_suffix_filter, validate_encoding, ArchiveSettings, InputSettings,
    OutputSettings, ParsingSettings, RouteConfig,
};
use crate::error::{IngestError, Result};
use crate::monitor::WatchMode;
use crate::output::OutputMode;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RoutesFile {
    routes: Vec<RouteSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteSpec {
    name: String,
    #[serde(default)]
    ingestion_contract: String,
    input: InputSpec,
    #[serde(default)]
    parsing: ParsingSpec,
    output: OutputSpec,
    archive: ArchiveSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSpec {
    path: String,
    #[serde(default = "default_watch_mode")]
    watch_mode: String,
    #[serde(default = "default_poll_interval")]
    poll_interval_seconds: u64,
    #[serde(default = "default_hybrid_poll_interval")]
    hybrid_poll_interval_seconds: u64,
    #[serde(default)]
    filename_pattern: String,
    #[serde(default)]
    suffix_filter: String,
    #[serde(default)]
    max_files_per_poll: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsingSpec {
    #[serde(default = "default_true")]
    has_header: bool,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default = "default_quote")]
    quote_char: String,
    #[serde(default = "default_encoding")]
    encoding: String,
}

impl Default for ParsingSpec {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: default_delimiter(),
            quote_char: default_quote(),
            encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputSpec {
    #[serde(rename = "type")]
    kind: String,
    destination: String,
    #[serde(default = "default_true")]
    include_envelope: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveSpec {
    processed_path: String,
    failed_path: String,
    #[serde(default)]
    ignored_path: String,
    #[serde(default = "default_true")]
    timestamp: bool,
}

fn default_watch_mode() -> String {
    "event".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_hybrid_poll_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quote() -> String {
    "\"".to_string()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Load and validate every route in the file. Validation failures name the
/// offending route; archive directories are created here.
pub fn load_routes(config_path: &Path) -> Result<Vec<RouteConfig>> {
    let data = fs::read_to_string(config_path).map_err(|e| {
        IngestError::Config(format!(
            "failed to read routes config {}: {}",
            config_path.display(),
            e
        ))
    })?;
    let parsed: RoutesFile = serde_json::from_str(&data)
        .map_err(|e| IngestError::Config(format!("failed to parse routes JSON: {}", e)))?;

    let mut routes = Vec::with_capacity(parsed.routes.len());
    for spec in parsed.routes {
        routes.push(resolve_route(spec)?);
    }
    Ok(routes)
}

fn resolve_route(spec: RouteSpec) -> Result<RouteConfig> {
    if spec.name.is_empty() {
        return Err(IngestError::Config(
            "route missing required field 'name'".to_string(),
        ));
    }
    let route_err =
        |msg: String| IngestError::Config(format!("route '{}': {}", spec.name, msg));

    if spec.input.path.is_empty() {
        return Err(route_err("missing required field 'input.path'".to_string()));
    }
    let input_path = PathBuf::from(&spec.input.path);
    if !input_path.is_dir() {
        return Err(route_err(format!(
            "input path does not exist: {}",
            spec.input.path
        )));
    }

    if spec.input.poll_interval_seconds < 1 {
        return Err(route_err(
            "pollIntervalSeconds must be >= 1".to_string(),
        ));
    }

    let watch_mode: WatchMode = spec
        .input
        .watch_mode
        .parse()
        .map_err(|e: IngestError| route_err(e.to_string()))?;

    if !spec.input.filename_pattern.is_empty() {
        Regex::new(&spec.input.filename_pattern)
            .map_err(|e| route_err(format!("invalid filename pattern: {}", e)))?;
    }

    validate_encoding(&spec.parsing.encoding).map_err(|e| route_err(e.to_string()))?;

    if spec.output.kind.is_empty() || spec.output.destination.is_empty() {
        return Err(route_err(
            "missing required output configuration".to_string(),
        ));
    }
    let mode: OutputMode = spec
        .output
        .kind
        .parse()
        .map_err(|e: IngestError| route_err(e.to_string()))?;

    if spec.archive.processed_path.is_empty() || spec.archive.failed_path.is_empty() {
        return Err(route_err("missing required archive paths".to_string()));
    }

    let processed = PathBuf::from(&spec.archive.processed_path);
    let failed = PathBuf::from(&spec.archive.failed_path);
    let ignored = if spec.archive.ignored_path.is_empty() {
        // No ignored path configured: use a sibling of the processed dir so
        // every route still has three terminal categories.
        processed
            .parent()
            .map(|p| p.join("ignored"))
            .unwrap_or_else(|| PathBuf::from("ignored"))
    } else {
        PathBuf::from(&spec.archive.ignored_path)
    };

    for dir in [&processed, &failed, &ignored] {
        fs::create_dir_all(dir).map_err(|e| {
            route_err(format!(
                "failed to create archive directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    let (folder, queue_name) = match mode {
        OutputMode::File => (Some(PathBuf::from(&spec.output.destination)), None),
        OutputMode::Queue => (
            None,
            Some(parse_queue_destination(&spec.output.destination)),
        ),
        // A single destination string names the queue; the file side of a
        // dual sink falls back to the OUTPUT_FOLDER environment setting.
        OutputMode::Both => (
            Some(PathBuf::from(get_env("OUTPUT_FOLDER", "./output"))),
            Some(parse_queue_destination(&spec.output.destination)),
        ),
    };

    Ok(RouteConfig {
        name: spec.name,
        ingestion_contract: spec.ingestion_contract,
        input: InputSettings {
            path: input_path,
            watch_mode,
            poll_interval: Duration::from_secs(spec.input.poll_interval_seconds),
            hybrid_poll_interval: Duration::from_secs(spec.input.hybrid_poll_interval_seconds),
            max_files_per_poll: spec.input.max_files_per_poll,
            filename_pattern: spec.input.filename_pattern,
            suffix_filter: parse_suffix_filter(&spec.input.suffix_filter),
        },
        parsing: ParsingSettings {
            delimiter: first_byte(&spec.parsing.delimiter, "delimiter")?,
            quote_char: first_byte(&spec.parsing.quote_char, "quoteChar")?,
            encoding: spec.parsing.encoding,
            has_header: spec.parsing.has_header,
        },
        output: OutputSettings {
            mode,
            folder,
            queue_name,
            include_envelope: spec.output.include_envelope,
        },
        archive: ArchiveSettings {
            processed,
            ignored,
            failed,
            add_timestamp: spec.archive.timestamp,
        },
    })
}

/// Extract the queue name from a destination like `rabbitmq://products_queue`
/// or a bare `products_queue`.
fn parse_queue_destination(destination: &str) -> String {
    destination
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(destination)
        .to_string()
}
