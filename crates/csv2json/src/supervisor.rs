//! Multi-route startup and graceful shutdown.
//!
//! Each route runs as an independent tokio task with its own detector and
//! sink chain; the only coordination point is the shared stop signal. A
//! route that fails to start is logged and skipped so the others keep
//! running.

use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::processor::RouteProcessor;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Supervisor {
    stop_tx: watch::Sender<()>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    /// Construct and launch one processor per configured route.
    pub async fn start(settings: &Settings) -> Result<Supervisor> {
        let (stop_tx, stop_rx) = watch::channel(());
        let mut tasks = Vec::with_capacity(settings.routes.len());

        for route in &settings.routes {
            info!(
                "initializing route '{}': input {} -> {} output",
                route.name,
                route.input.path.display(),
                route.output.mode
            );

            let processor = match RouteProcessor::new(
                route,
                &settings.queue,
                settings.logging.queue_messages,
            )
            .await
            {
                Ok(processor) => Arc::new(processor),
                Err(e) => {
                    error!("failed to initialize route '{}': {}", route.name, e);
                    continue;
                }
            };

            let stop = stop_rx.clone();
            let task_name = route.name.clone();
            let handle = tokio::spawn(async move {
                info!("starting route processor: {}", task_name);
                if let Err(e) = processor.run(stop).await {
                    error!("route '{}' processor failed: {}", task_name, e);
                }
            });
            tasks.push((route.name.clone(), handle));
        }

        if tasks.is_empty() {
            return Err(IngestError::Config(
                "no routes could be started".to_string(),
            ));
        }

        info!("{} route(s) active", tasks.len());
        Ok(Supervisor { stop_tx, tasks })
    }

    /// Signal every detector to stop and wait for all routes to drain.
    /// In-flight file processing is allowed to complete.
    pub async fn shutdown(self) {
        info!("stopping all routes...");
        let _ = self.stop_tx.send(());

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => info!("route stopped: {}", name),
                Err(e) => error!("route '{}' task aborted: {}", name, e),
            }
        }
        info!("all routes stopped");
    }
}
