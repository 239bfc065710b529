//! Per-route file detection.
//!
//! Three strategies share one emit contract: at most one callback invocation
//! per file basename over the detector's lifetime, issued only once the file
//! is stable and absent from the processed-file registry. Files already
//! present at startup are registered without emitting.

mod event;
mod hybrid;
mod poll;

pub use event::EventMonitor;
pub use hybrid::HybridMonitor;
pub use poll::PollingMonitor;

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Stat interval for the file-readiness check.
pub const DEFAULT_READINESS_DELAY: Duration = Duration::from_secs(2);

/// File detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Event,
    Poll,
    Hybrid,
}

impl FromStr for WatchMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "event" => Ok(WatchMode::Event),
            "poll" => Ok(WatchMode::Poll),
            "hybrid" => Ok(WatchMode::Hybrid),
            other => Err(IngestError::Config(format!(
                "unsupported watch mode: {} (supported: event, poll, hybrid)",
                other
            ))),
        }
    }
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatchMode::Event => "event",
            WatchMode::Poll => "poll",
            WatchMode::Hybrid => "hybrid",
        })
    }
}

/// Detector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Invoked once per ready file. Errors are logged by the detector and do
/// not stop detection.
#[async_trait]
pub trait FileCallback: Send + Sync {
    async fn on_file(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub watch_dir: PathBuf,
    pub poll_interval: Duration,
    pub hybrid_poll_interval: Duration,
    /// 0 = unlimited files admitted per poll cycle.
    pub max_files_per_poll: usize,
    pub readiness_delay: Duration,
}

/// One abstract detector, three concrete strategies.
pub enum FileMonitor {
    Event(EventMonitor),
    Poll(PollingMonitor),
    Hybrid(HybridMonitor),
}

impl FileMonitor {
    /// Select a strategy for the route. Watcher construction failure in
    /// event or hybrid mode falls back to polling.
    pub fn create(mode: WatchMode, config: MonitorConfig) -> FileMonitor {
        match mode {
            WatchMode::Event => match EventMonitor::new(config.clone()) {
                Ok(monitor) => FileMonitor::Event(monitor),
                Err(e) => {
                    warn!(
                        "failed to create event monitor ({}), falling back to polling",
                        e
                    );
                    FileMonitor::Poll(PollingMonitor::new(config))
                }
            },
            WatchMode::Poll => FileMonitor::Poll(PollingMonitor::new(config)),
            WatchMode::Hybrid => match HybridMonitor::new(config.clone()) {
                Ok(monitor) => FileMonitor::Hybrid(monitor),
                Err(e) => {
                    warn!(
                        "failed to create hybrid monitor ({}), falling back to polling",
                        e
                    );
                    FileMonitor::Poll(PollingMonitor::new(config))
                }
            },
        }
    }

    /// Run the detector until the stop signal fires.
    pub async fn start(
        &mut self,
        callback: Arc<dyn FileCallback>,
        stop: watch::Receiver<()>,
    ) -> Result<()> {
        match self {
            FileMonitor::Event(m) => m.start(callback, stop).await,
            FileMonitor::Poll(m) => m.start(callback, stop).await,
            FileMonitor::Hybrid(m) => m.start(callback, stop).await,
        }
    }

    pub fn state(&self) -> MonitorState {
        match self {
            FileMonitor::Event(m) => m.state(),
            FileMonitor::Poll(m) => m.state(),
            FileMonitor::Hybrid(m) => m.state(),
        }
    }
}

/// Register every pre-existing regular file without emitting. Pre-existing
/// files at startup are intentionally skipped.
pub(crate) fn scan_existing(watch_dir: &Path, registry: &mut HashSet<String>) {
    match fs::read_dir(watch_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    registry.insert(name.to_string());
                }
            }
            info!(
                "found {} existing files (will not process)",
                registry.len()
            );
        }
        Err(e) => warn!("unable to scan watch folder: {}", e),
    }
}

/// Two stats separated by `delay` must observe the same size on a regular
/// file; partially written files fail the check and are retried on a later
/// event or poll.
pub(crate) async fn is_file_ready(path: &Path, delay: Duration) -> bool {
    let first = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    if !first.is_file() {
        return false;
    }

    tokio::time::sleep(delay).await;

    let second = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    second.is_file() && first.len() == second.len()
}

/// Readiness-check a candidate and invoke the callback at most once per
/// basename. Returns true if the file was emitted.
pub(crate) async fn emit_if_ready(
    path: &Path,
    delay: Duration,
    registry: &mut HashSet<String>,
    callback: &Arc<dyn FileCallback>,
    origin: &str,
) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return false,
    };
    if registry.contains(&name) {
        return false;
    }
    if !is_file_ready(path, delay).await {
        return false;
    }

    if origin.is_empty() {
        info!("detected new file: {}", name);
    } else {
        info!("detected new file ({}): {}", origin, name);
    }

    if let Err(e) = callback.on_file(path).await {
        error!("error processing {}: {}", name, e);
    }

    // Mark as processed even after a callback error; the archiver has
    // already moved the file or will re-offer it on the next run.
    registry.insert(name);
    true
}

/// One poll cycle: emit new ready files in directory-iteration order,
/// bounded by `max_files_per_poll` when non-zero.
pub(crate) async fn scan_for_new(
    watch_dir: &Path,
    delay: Duration,
    max_files_per_poll: usize,
    registry: &mut HashSet<String>,
    callback: &Arc<dyn FileCallback>,
    origin: &str,
) -> Result<()> {
    let entries = fs::read_dir(watch_dir)?;
    let mut emitted = 0usize;

    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        if max_files_per_poll > 0 && emitted >= max_files_per_poll {
            info!(
                "reached max files per poll limit ({}), remaining files will be processed in next cycle",
                max_files_per_poll
            );
            break;
        }

        if emit_if_ready(&entry.path(), delay, registry, callback, origin).await {
            emitted += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) struct Recorder {
        pub seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn names(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FileCallback for Recorder {
        async fn on_file(&self, path: &Path) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(path.file_name().unwrap().to_str().unwrap().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn factory_builds_poll_strategy_and_tracks_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig {
            watch_dir: dir.path().to_path_buf(),
            poll_interval: Duration::from_millis(20),
            hybrid_poll_interval: Duration::from_millis(50),
            max_files_per_poll: 0,
            readiness_delay: Duration::from_millis(1),
        };
        let mut monitor = FileMonitor::create(WatchMode::Poll, config);
        assert!(matches!(monitor, FileMonitor::Poll(_)));
        assert_eq!(monitor.state(), MonitorState::Starting);

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());
        stop_tx.send(()).unwrap();
        monitor.start(callback, stop_rx).await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn watch_mode_parses_known_values() {
        assert_eq!("event".parse::<WatchMode>().unwrap(), WatchMode::Event);
        assert_eq!("poll".parse::<WatchMode>().unwrap(), WatchMode::Poll);
        assert_eq!("hybrid".parse::<WatchMode>().unwrap(), WatchMode::Hybrid);
        assert!("inotify".parse::<WatchMode>().is_err());
    }

    #[test]
    fn scan_existing_registers_files_not_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), b"x").unwrap();
        fs::write(dir.path().join("b.csv"), b"y").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut registry = HashSet::new();
        scan_existing(dir.path(), &mut registry);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a.csv"));
        assert!(registry.contains("b.csv"));
        assert!(!registry.contains("sub"));
    }

    #[tokio::test]
    async fn readiness_rejects_growing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.csv");
        fs::write(&path, b"start").unwrap();

        let check = is_file_ready(&path, Duration::from_millis(50));
        let grower = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fs::write(&path, b"start-plus-more-bytes").unwrap();
        };
        let (ready, _) = tokio::join!(check, grower);
        assert!(!ready);
    }

    #[tokio::test]
    async fn readiness_accepts_stable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stable.csv");
        fs::write(&path, b"done").unwrap();

        assert!(is_file_ready(&path, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn readiness_rejects_missing_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_file_ready(&dir.path().join("ghost"), Duration::from_millis(1)).await);
        assert!(!is_file_ready(dir.path(), Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn emit_is_suppressed_for_registered_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.csv");
        fs::write(&path, b"x").unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let mut registry = HashSet::new();
        registry.insert("seen.csv".to_string());

        let emitted = emit_if_ready(
            &path,
            Duration::from_millis(1),
            &mut registry,
            &callback,
            "",
        )
        .await;

        assert!(!emitted);
        assert!(recorder.names().is_empty());
    }

    #[tokio::test]
    async fn scan_honors_max_files_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{}.csv", i)), b"x").unwrap();
        }

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let mut registry = HashSet::new();

        scan_for_new(
            dir.path(),
            Duration::from_millis(1),
            2,
            &mut registry,
            &callback,
            "",
        )
        .await
        .unwrap();
        assert_eq!(recorder.names().len(), 2);

        scan_for_new(
            dir.path(),
            Duration::from_millis(1),
            2,
            &mut registry,
            &callback,
            "",
        )
        .await
        .unwrap();
        assert_eq!(recorder.names().len(), 4);

        scan_for_new(
            dir.path(),
            Duration::from_millis(1),
            2,
            &mut registry,
            &callback,
            "",
        )
        .await
        .unwrap();
        assert_eq!(recorder.names().len(), 5);
    }
}
