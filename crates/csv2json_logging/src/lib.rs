//! Shared logging utilities for csv2json binaries.
//!
//! One call wires up tracing for the whole process: a console layer on
//! stdout plus, when a log file is configured, a second layer appending to
//! that file with ANSI colors disabled.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration shared by csv2json binaries.
pub struct LogConfig<'a> {
    /// Default filter directive when `RUST_LOG` is unset (e.g. `info`).
    pub level: &'a str,
    /// Optional log file, opened in append mode.
    pub file: Option<&'a Path>,
}

/// Initialize tracing with a stdout layer and an optional file layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_filter(make_filter(config.level)),
    );

    match config.file {
        Some(path) => {
            let writer = SharedFileWriter::open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(make_filter(config.level)),
                )
                .init();
        }
        None => registry.init(),
    }

    Ok(())
}

fn make_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()))
}

/// Append-mode file writer shared between tracing workers.
#[derive(Clone)]
struct SharedFileWriter {
    inner: Arc<Mutex<File>>,
}

impl SharedFileWriter {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct SharedFileGuard {
    inner: Arc<Mutex<File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.log");

        let writer = SharedFileWriter::open(&path).unwrap();
        {
            use tracing_subscriber::fmt::MakeWriter;
            let mut guard = writer.make_writer();
            guard.write_all(b"first\n").unwrap();
            guard.flush().unwrap();
        }

        let reopened = SharedFileWriter::open(&path).unwrap();
        {
            use tracing_subscriber::fmt::MakeWriter;
            let mut guard = reopened.make_writer();
            guard.write_all(b"second\n").unwrap();
            guard.flush().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("service.log");
        SharedFileWriter::open(&path).unwrap();
        assert!(path.exists());
    }
}
