//! Event-driven detector backed by the platform's filesystem notification
//! primitive.

use super::{emit_if_ready, scan_existing, FileCallback, MonitorConfig, MonitorState};
use crate::error::{IngestError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

pub struct EventMonitor {
    config: MonitorConfig,
    registry: HashSet<String>,
    state: MonitorState,
    watcher: RecommendedWatcher,
    events: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
}

impl EventMonitor {
    /// Construct the OS watcher. Failure here is the factory's cue to fall
    /// back to polling.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| IngestError::Watcher(format!("failed to create watcher: {}", e)))?;

        Ok(Self {
            config,
            registry: HashSet::new(),
            state: MonitorState::Starting,
            watcher,
            events: Some(rx),
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub async fn start(
        &mut self,
        callback: Arc<dyn FileCallback>,
        mut stop: watch::Receiver<()>,
    ) -> Result<()> {
        self.state = MonitorState::Starting;
        let mut events = self
            .events
            .take()
            .ok_or_else(|| IngestError::Watcher("detector already started".to_string()))?;

        scan_existing(&self.config.watch_dir, &mut self.registry);

        self.watcher
            .watch(&self.config.watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                IngestError::Watcher(format!(
                    "failed to add watch on {}: {}",
                    self.config.watch_dir.display(),
                    e
                ))
            })?;

        info!(
            "event-driven file monitor started on {}",
            self.config.watch_dir.display()
        );

        self.state = MonitorState::Running;
        loop {
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(Ok(event)) => {
                        if is_relevant(&event.kind) {
                            for path in &event.paths {
                                emit_if_ready(
                                    path,
                                    self.config.readiness_delay,
                                    &mut self.registry,
                                    &callback,
                                    "event",
                                )
                                .await;
                            }
                        }
                    }
                    Some(Err(e)) => warn!("watcher error: {}", e),
                    None => break,
                },
                _ = stop.changed() => break,
            }
        }

        self.state = MonitorState::Stopping;
        if let Err(e) = self.watcher.unwatch(&self.config.watch_dir) {
            warn!("failed to remove watch: {}", e);
        }
        info!("event-driven file monitor stopped");
        self.state = MonitorState::Stopped;
        Ok(())
    }
}

/// Create and write events announce new content; everything else (renames
/// handled via create, attribute churn, removals) is noise here.
pub(crate) fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

#[cfg(test)]
mod tests {
    use super::super::tests::Recorder;
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> MonitorConfig {
        MonitorConfig {
            watch_dir: dir.to_path_buf(),
            poll_interval: Duration::from_millis(50),
            hybrid_poll_interval: Duration::from_millis(100),
            max_files_per_poll: 0,
            readiness_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn relevance_filter_matches_create_and_modify() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_relevant(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[tokio::test]
    async fn emits_for_new_files_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.csv"), b"pre-existing").unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());

        let mut monitor = EventMonitor::new(test_config(dir.path())).unwrap();
        let watch_dir = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            monitor.start(callback, stop_rx).await.unwrap();
            monitor
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::write(watch_dir.join("new.csv"), b"fresh").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        stop_tx.send(()).unwrap();
        let monitor = handle.await.unwrap();

        assert_eq!(recorder.names(), vec!["new.csv"]);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = EventMonitor::new(test_config(dir.path())).unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());
        stop_tx.send(()).unwrap();
        monitor.start(callback.clone(), stop_rx).await.unwrap();

        let (_tx2, rx2) = watch::channel(());
        let err = monitor.start(callback, rx2).await.unwrap_err();
        assert!(matches!(err, IngestError::Watcher(_)));
    }
}
