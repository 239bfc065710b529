//! Output delivery: file sink, queue publisher, or both.

mod file_handler;
mod queue_handler;

pub use file_handler::FileHandler;
pub use queue_handler::QueueHandler;

use crate::config::{OutputSettings, QueueSettings};
use crate::envelope::EnvelopeContext;
use crate::error::{IngestError, Result};
use crate::parser::ParseResult;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a route delivers its payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    File,
    Queue,
    Both,
}

impl FromStr for OutputMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(OutputMode::File),
            "queue" => Ok(OutputMode::Queue),
            "both" => Ok(OutputMode::Both),
            other => Err(IngestError::Config(format!(
                "invalid output type: {} (valid: file, queue, both)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputMode::File => "file",
            OutputMode::Queue => "queue",
            OutputMode::Both => "both",
        })
    }
}

/// Delivery contract shared by all sinks.
///
/// `identifier` is the source file basename; implementations derive output
/// names and envelope metadata from it.
#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn send(&self, result: &ParseResult, identifier: &str) -> Result<()>;

    /// Release held resources. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Composite sink: the file write is the durable record, so it strictly
/// precedes the queue publish. A file failure means the queue is never
/// contacted.
pub struct DualHandler {
    file: Box<dyn OutputHandler>,
    queue: Box<dyn OutputHandler>,
}

impl DualHandler {
    pub fn new(file: Box<dyn OutputHandler>, queue: Box<dyn OutputHandler>) -> Self {
        Self { file, queue }
    }
}

#[async_trait]
impl OutputHandler for DualHandler {
    async fn send(&self, result: &ParseResult, identifier: &str) -> Result<()> {
        self.file
            .send(result, identifier)
            .await
            .map_err(|e| IngestError::Sink(format!("file output failed: {}", e)))?;
        self.queue
            .send(result, identifier)
            .await
            .map_err(|e| IngestError::Sink(format!("queue output failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let file_result = self.file.close().await;
        let queue_result = self.queue.close().await;
        file_result?;
        queue_result
    }
}

/// Build the sink chain for one route.
pub async fn create_handler(
    output: &OutputSettings,
    queue_settings: &QueueSettings,
    envelope: EnvelopeContext,
    log_messages: bool,
) -> Result<Box<dyn OutputHandler>> {
    match output.mode {
        OutputMode::File => {
            let folder = require_folder(output)?;
            Ok(Box::new(FileHandler::new(folder)))
        }
        OutputMode::Queue => {
            let queue_name = require_queue(output)?;
            let handler =
                QueueHandler::connect(queue_settings, &queue_name, envelope, log_messages).await?;
            Ok(Box::new(handler))
        }
        OutputMode::Both => {
            let folder = require_folder(output)?;
            let queue_name = require_queue(output)?;
            let queue =
                QueueHandler::connect(queue_settings, &queue_name, envelope, log_messages).await?;
            Ok(Box::new(DualHandler::new(
                Box::new(FileHandler::new(folder)),
                Box::new(queue),
            )))
        }
    }
}

fn require_folder(output: &OutputSettings) -> Result<PathBuf> {
    output
        .folder
        .clone()
        .ok_or_else(|| IngestError::Config("output folder is not configured".to_string()))
}

fn require_queue(output: &OutputSettings) -> Result<String> {
    output
        .queue_name
        .clone()
        .ok_or_else(|| IngestError::Config("queue name is not configured".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingHandler {
        sends: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl OutputHandler for RecordingHandler {
        async fn send(&self, _result: &ParseResult, _identifier: &str) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IngestError::Sink("boom".to_string()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sample() -> ParseResult {
        ParseResult {
            headers: vec!["a".into()],
            rows: vec![vec!["1".into()]],
        }
    }

    #[tokio::test]
    async fn dual_sends_file_before_queue() {
        let file_sends = Arc::new(AtomicUsize::new(0));
        let queue_sends = Arc::new(AtomicUsize::new(0));
        let dual = DualHandler::new(
            Box::new(RecordingHandler {
                sends: file_sends.clone(),
                fail: false,
            }),
            Box::new(RecordingHandler {
                sends: queue_sends.clone(),
                fail: false,
            }),
        );

        dual.send(&sample(), "data.csv").await.unwrap();
        assert_eq!(file_sends.load(Ordering::SeqCst), 1);
        assert_eq!(queue_sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dual_skips_queue_when_file_fails() {
        let file_sends = Arc::new(AtomicUsize::new(0));
        let queue_sends = Arc::new(AtomicUsize::new(0));
        let dual = DualHandler::new(
            Box::new(RecordingHandler {
                sends: file_sends.clone(),
                fail: true,
            }),
            Box::new(RecordingHandler {
                sends: queue_sends.clone(),
                fail: false,
            }),
        );

        let err = dual.send(&sample(), "data.csv").await.unwrap_err();
        assert!(err.to_string().starts_with("file output failed"));
        assert_eq!(file_sends.load(Ordering::SeqCst), 1);
        assert_eq!(queue_sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dual_surfaces_queue_failure_after_file_write() {
        let file_sends = Arc::new(AtomicUsize::new(0));
        let queue_sends = Arc::new(AtomicUsize::new(0));
        let dual = DualHandler::new(
            Box::new(RecordingHandler {
                sends: file_sends.clone(),
                fail: false,
            }),
            Box::new(RecordingHandler {
                sends: queue_sends.clone(),
                fail: true,
            }),
        );

        let err = dual.send(&sample(), "data.csv").await.unwrap_err();
        assert!(err.to_string().starts_with("queue output failed"));
        assert_eq!(file_sends.load(Ordering::SeqCst), 1);
        assert_eq!(queue_sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn output_mode_parses_known_values() {
        assert_eq!("file".parse::<OutputMode>().unwrap(), OutputMode::File);
        assert_eq!("queue".parse::<OutputMode>().unwrap(), OutputMode::Queue);
        assert_eq!("both".parse::<OutputMode>().unwrap(), OutputMode::Both);
        assert!("kafka-topic".parse::<OutputMode>().is_err());
    }
}
