//! Hybrid detector: event watcher as primary, a slower backup poll to
//! bound worst-case latency when the platform primitive misses events
//! (containerized volumes, NFS). The registry dedupes across both sources.

use super::{
    emit_if_ready, event::is_relevant, scan_existing, scan_for_new, FileCallback, MonitorConfig,
    MonitorState,
};
use crate::error::{IngestError, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

pub struct HybridMonitor {
    config: MonitorConfig,
    registry: HashSet<String>,
    state: MonitorState,
    watcher: RecommendedWatcher,
    events: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
}

impl HybridMonitor {
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
            "hybrid file monitor started on {} (events + {:?} polling backup)",
            self.config.watch_dir.display(),
            self.config.hybrid_poll_interval
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.hybrid_poll_interval,
            self.config.hybrid_poll_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

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
                _ = ticker.tick() => {
                    if let Err(e) = scan_for_new(
                        &self.config.watch_dir,
                        self.config.readiness_delay,
                        self.config.max_files_per_poll,
                        &mut self.registry,
                        &callback,
                        "backup poll",
                    )
                    .await
                    {
                        warn!("error during backup scan: {}", e);
                    }
                }
                _ = stop.changed() => break,
            }
        }

        self.state = MonitorState::Stopping;
        if let Err(e) = self.watcher.unwatch(&self.config.watch_dir) {
            warn!("failed to remove watch: {}", e);
        }
        info!("hybrid file monitor stopped");
        self.state = MonitorState::Stopped;
        Ok(())
    }
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
            hybrid_poll_interval: Duration::from_millis(120),
            max_files_per_poll: 0,
            readiness_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn backup_poll_dedupes_against_event_emissions() {
        let dir = tempfile::tempdir().unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());

        let mut monitor = HybridMonitor::new(test_config(dir.path())).unwrap();
        let watch_dir = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            monitor.start(callback, stop_rx).await.unwrap();
            monitor
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        fs::write(watch_dir.join("data.csv"), b"payload").unwrap();

        // Give both the event path and several backup polls time to fire;
        // the registry must keep the emission unique.
        tokio::time::sleep(Duration::from_millis(500)).await;

        stop_tx.send(()).unwrap();
        let monitor = handle.await.unwrap();

        assert_eq!(recorder.names(), vec!["data.csv"]);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
