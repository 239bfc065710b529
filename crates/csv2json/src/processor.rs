//! Per-route pipeline orchestration.
//!
//! One processor owns the parser, sink chain and archiver for a route and
//! serves as the detector callback. Every input terminates in exactly one
//! archive category; per-file errors are collapsed into archive outcomes
//! and never stop the detector loop.

use crate::archiver::{Archiver, Category};
use crate::config::{QueueSettings, RouteConfig};
use crate::envelope::{redacted_broker_uri, EnvelopeContext};
use crate::error::Result;
use crate::monitor::{
    FileCallback, FileMonitor, MonitorConfig, WatchMode, DEFAULT_READINESS_DELAY,
};
use crate::output::{self, OutputHandler, OutputMode};
use crate::parser::Parser;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct RouteProcessor {
    name: String,
    watch_mode: WatchMode,
    monitor_config: MonitorConfig,
    pattern: Option<Regex>,
    suffix_filter: Vec<String>,
    parser: Parser,
    archiver: Archiver,
    output: Box<dyn OutputHandler>,
}

impl RouteProcessor {
    /// Build the full pipeline for one route. Queue-enabled routes connect
    /// to the broker here, so a dead broker fails the route at startup.
    pub async fn new(
        route: &RouteConfig,
        queue_settings: &QueueSettings,
        log_queue_messages: bool,
    ) -> Result<Self> {
        let pattern = match route.input.filename_pattern.as_str() {
            "" | ".*" => None,
            raw => Some(Regex::new(raw)?),
        };

        let parser = Parser::new(
            route.parsing.delimiter,
            route.parsing.quote_char,
            route.parsing.has_header,
        );

        let archiver = Archiver::new(
            route.archive.processed.clone(),
            route.archive.ignored.clone(),
            route.archive.failed.clone(),
            route.archive.add_timestamp,
        );

        let queue_enabled = matches!(route.output.mode, OutputMode::Queue | OutputMode::Both);
        let envelope = EnvelopeContext {
            route: route.name.clone(),
            ingestion_contract: route.ingestion_contract.clone(),
            source_base: route.input.path.clone(),
            queue: if queue_enabled {
                route.output.queue_name.clone()
            } else {
                None
            },
            broker: if queue_enabled {
                Some(redacted_broker_uri(
                    &queue_settings.kind,
                    &queue_settings.host,
                    queue_settings.port,
                    &queue_settings.username,
                    &queue_settings.password,
                ))
            } else {
                None
            },
            include_envelope: route.output.include_envelope,
        };

        let output =
            output::create_handler(&route.output, queue_settings, envelope, log_queue_messages)
                .await?;

        Ok(Self {
            name: route.name.clone(),
            watch_mode: route.input.watch_mode,
            monitor_config: MonitorConfig {
                watch_dir: route.input.path.clone(),
                poll_interval: route.input.poll_interval,
                hybrid_poll_interval: route.input.hybrid_poll_interval,
                max_files_per_poll: route.input.max_files_per_poll,
                readiness_delay: DEFAULT_READINESS_DELAY,
            },
            pattern,
            suffix_filter: route.input.suffix_filter.clone(),
            parser,
            archiver,
            output,
        })
    }

    /// Run the detector loop until the stop signal fires, then close the
    /// sink chain.
    pub async fn run(self: Arc<Self>, stop: watch::Receiver<()>) -> Result<()> {
        let mut monitor = FileMonitor::create(self.watch_mode, self.monitor_config.clone());
        let callback: Arc<dyn FileCallback> = self.clone();
        let result = monitor.start(callback, stop).await;

        if let Err(e) = self.output.close().await {
            warn!(
                "route '{}': error closing output handler: {}",
                self.name, e
            );
        }
        result
    }

    fn should_process(&self, filename: &str) -> bool {
        if !self.suffix_filter.is_empty()
            && !self
                .suffix_filter
                .iter()
                .any(|suffix| filename.ends_with(suffix.as_str()))
        {
            return false;
        }
        match &self.pattern {
            Some(regex) => regex.is_match(filename),
            None => true,
        }
    }

    async fn process_file(&self, path: &Path) -> Result<()> {
        let started = Instant::now();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if !self.should_process(&filename) {
            self.archiver.archive(path, Category::Ignored, None)?;
            info!(
                "route '{}': ignored {} (does not match filters, {} ms)",
                self.name,
                filename,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        if let Err(e) = self.parser.validate(path) {
            self.archiver
                .archive(path, Category::Failed, Some(&e.to_string()))?;
            warn!(
                "route '{}': failed {} (validation: {}, {} ms)",
                self.name,
                filename,
                e,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        let result = match self.parser.parse_ordered(path) {
            Ok(result) => result,
            Err(e) => {
                self.archiver
                    .archive(path, Category::Failed, Some(&e.to_string()))?;
                warn!(
                    "route '{}': failed {} (parse: {}, {} ms)",
                    self.name,
                    filename,
                    e,
                    started.elapsed().as_millis()
                );
                return Ok(());
            }
        };

        if result.rows.is_empty() {
            self.archiver
                .archive(path, Category::Failed, Some("No data parsed"))?;
            warn!(
                "route '{}': failed {} (no data parsed, {} ms)",
                self.name,
                filename,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        if let Err(e) = self.output.send(&result, &filename).await {
            self.archiver
                .archive(path, Category::Failed, Some(&e.to_string()))?;
            warn!(
                "route '{}': failed {} (sink: {}, {} ms)",
                self.name,
                filename,
                e,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        self.archiver.archive(path, Category::Processed, None)?;
        info!(
            "route '{}': processed {} ({} rows in {} ms)",
            self.name,
            filename,
            result.rows.len(),
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

#[async_trait]
impl FileCallback for RouteProcessor {
    async fn on_file(&self, path: &Path) -> Result<()> {
        self.process_file(path).await
    }
}
