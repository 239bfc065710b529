//! Interval-driven detector: lists the watch directory on a fixed tick.
//!
//! The dependable strategy for network filesystems and bind mounts where
//! event primitives drop notifications.

use super::{scan_existing, scan_for_new, FileCallback, MonitorConfig, MonitorState};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct PollingMonitor {
    config: MonitorConfig,
    registry: HashSet<String>,
    state: MonitorState,
}

impl PollingMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            registry: HashSet::new(),
            state: MonitorState::Starting,
        }
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
        scan_existing(&self.config.watch_dir, &mut self.registry);

        info!(
            "polling-based file monitor started on {} (every {:?})",
            self.config.watch_dir.display(),
            self.config.poll_interval
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.state = MonitorState::Running;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = scan_for_new(
                        &self.config.watch_dir,
                        self.config.readiness_delay,
                        self.config.max_files_per_poll,
                        &mut self.registry,
                        &callback,
                        "",
                    )
                    .await
                    {
                        warn!("error during scan: {}", e);
                    }
                }
                _ = stop.changed() => break,
            }
        }

        self.state = MonitorState::Stopping;
        info!("polling-based file monitor stopped");
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

    fn test_config(dir: &std::path::Path, max_files: usize) -> MonitorConfig {
        MonitorConfig {
            watch_dir: dir.to_path_buf(),
            poll_interval: Duration::from_millis(30),
            hybrid_poll_interval: Duration::from_millis(100),
            max_files_per_poll: max_files,
            readiness_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn startup_files_are_skipped_and_new_files_emitted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.csv"), b"pre-existing").unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());

        let mut monitor = PollingMonitor::new(test_config(dir.path(), 0));
        let watch_dir = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            monitor.start(callback, stop_rx).await.unwrap();
            monitor
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        fs::write(watch_dir.join("new.csv"), b"fresh").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        stop_tx.send(()).unwrap();
        let monitor = handle.await.unwrap();

        assert_eq!(recorder.names(), vec!["new.csv"]);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn same_basename_is_processed_once() {
        let dir = tempfile::tempdir().unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());

        let mut monitor = PollingMonitor::new(test_config(dir.path(), 0));
        let watch_dir = dir.path().to_path_buf();
        let handle = tokio::spawn(async move { monitor.start(callback, stop_rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        fs::write(watch_dir.join("repeat.csv"), b"v1").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        // Same basename appearing again must not re-emit.
        fs::write(watch_dir.join("repeat.csv"), b"v2").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(recorder.names(), vec!["repeat.csv"]);
    }

    #[tokio::test]
    async fn rate_limit_spreads_files_across_cycles() {
        let dir = tempfile::tempdir().unwrap();

        let recorder = Recorder::new();
        let callback: Arc<dyn FileCallback> = recorder.clone();
        let (stop_tx, stop_rx) = watch::channel(());

        let mut config = test_config(dir.path(), 2);
        config.poll_interval = Duration::from_millis(200);
        let mut monitor = PollingMonitor::new(config);
        let watch_dir = dir.path().to_path_buf();
        let handle = tokio::spawn(async move { monitor.start(callback, stop_rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        for i in 0..5 {
            fs::write(watch_dir.join(format!("f{}.csv", i)), b"x").unwrap();
        }

        // First cycle admits exactly two files.
        tokio::time::sleep(Duration::from_millis(290)).await;
        assert_eq!(recorder.names().len(), 2);

        // Later cycles drain the rest.
        tokio::time::sleep(Duration::from_millis(600)).await;
        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(recorder.names().len(), 5);
    }
}
