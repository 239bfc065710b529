//! csv2json service entry point.
//!
//! With no arguments the engine runs with configuration from the
//! environment (plus an optional `.env` file in the working directory).
//! `ROUTES_CONFIG` switches to multi-route mode. SIGINT/SIGTERM initiate
//! graceful shutdown.

use anyhow::Context;
use clap::Parser;
use csv2json::config::{self, Settings};
use csv2json::output::OutputMode;
use csv2json::supervisor::Supervisor;
use csv2json::version;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "csv2json",
    about = "Multi-route file ingestion engine: delimited text to JSON",
    disable_version_flag = true
)]
struct Cli {
    /// Display version information
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", version::full_version_info());
        return Ok(());
    }

    // Load .env if present; a missing file is not an error.
    dotenvy::dotenv().ok();

    let settings = config::load().context("failed to load configuration")?;

    csv2json_logging::init_logging(csv2json_logging::LogConfig {
        level: &settings.logging.level,
        file: settings.logging.file.as_deref(),
    })
    .context("failed to initialize logging")?;

    log_startup(&settings);

    let supervisor = Supervisor::start(&settings)
        .await
        .context("failed to start route processors")?;

    info!("service ready. monitoring for new files.");
    wait_for_shutdown().await?;
    info!("shutdown signal received, stopping gracefully...");

    supervisor.shutdown().await;
    info!("service stopped");
    Ok(())
}

fn log_startup(settings: &Settings) {
    info!("{}", version::full_version_info());

    if settings.multi_route {
        info!(
            "multi-route mode: {} route(s) configured",
            settings.routes.len()
        );
        for route in &settings.routes {
            let destination = match route.output.mode {
                OutputMode::File => route
                    .output
                    .folder
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                _ => route.output.queue_name.clone().unwrap_or_default(),
            };
            info!(
                "route '{}': {} -> {} ({}), watch mode {}, contract '{}'",
                route.name,
                route.input.path.display(),
                destination,
                route.output.mode,
                route.input.watch_mode,
                route.ingestion_contract
            );
        }
        return;
    }

    let route = &settings.routes[0];
    info!("legacy single-route mode");
    info!("input folder: {}", route.input.path.display());
    info!("watch mode: {}", route.input.watch_mode);
    info!("poll interval: {:?}", route.input.poll_interval);
    info!("max files per poll: {}", route.input.max_files_per_poll);
    if route.input.suffix_filter.is_empty() {
        info!("suffix filter: * (all files)");
    } else {
        info!("suffix filter: {:?}", route.input.suffix_filter);
    }
    info!("filename pattern: {}", route.input.filename_pattern);
    info!(
        "delimiter: {:?}, quote: {:?}, has header: {}",
        route.parsing.delimiter as char, route.parsing.quote_char as char, route.parsing.has_header
    );
    info!("output type: {}", route.output.mode);
    match route.output.mode {
        OutputMode::File => {
            if let Some(folder) = &route.output.folder {
                info!("output folder: {}", folder.display());
            }
        }
        _ => {
            info!(
                "queue: {} at {}:{}",
                settings.queue.kind, settings.queue.host, settings.queue.port
            );
            if let Some(queue_name) = &route.output.queue_name {
                info!("queue name: {}", queue_name);
            }
            info!("log queue messages: {}", settings.logging.queue_messages);
        }
    }
    info!(
        "archive: processed {} | ignored {} | failed {} (timestamp: {})",
        route.archive.processed.display(),
        route.archive.ignored.display(),
        route.archive.failed.display(),
        route.archive.add_timestamp
    );
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")?;
        Ok(())
    }
}
